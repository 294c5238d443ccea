//! Framework d'hébergement de services UPnP.
//!
//! Un service hébergé est un [`ServiceHost`] : il décrit son SCPD, répond
//! aux actions SOAP et fournit l'état complet servi à chaque nouvel
//! abonné GENA. Le stockage des variables multi-instances (InstanceID) est
//! mutualisé dans [`VariableStore`] ; la logique métier reste chez
//! l'embarqueur via les traits handler de chaque service concret.

pub mod avtransport;
pub mod connectionmanager;
pub mod contentdirectory;
pub mod renderingcontrol;

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::errors::ServiceError;
use crate::gena::propertyset;
use crate::gena::EventPublisher;
use crate::scpd::ScpdDocument;
use crate::soap::{build_soap_response, SoapAction};
use crate::types::{ServiceType, ServiceVariable};

/// Petit type somme de variables d'état, fourni par chaque module de
/// service concret.
pub trait VariableKind: Copy + Eq + Send + Sync + 'static {
    fn name(self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>
    where
        Self: Sized;
}

/// Réponse d'action : liste ordonnée (argument, valeur).
///
/// L'ordre d'insertion est l'ordre de sérialisation dans le corps SOAP.
#[derive(Debug, Clone)]
pub struct ActionResponse {
    name: String,
    service_type: ServiceType,
    arguments: Vec<(String, String)>,
}

impl ActionResponse {
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            service_type,
            arguments: Vec::new(),
        }
    }

    pub fn add_argument(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.arguments.push((name.into(), value.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[(String, String)] {
        &self.arguments
    }

    /// Corps SOAP `<u:NameResponse>` complet.
    pub fn to_soap_xml(&self) -> Result<String, xmltree::Error> {
        build_soap_response(
            &self.service_type.urn_type_string(),
            &self.name,
            &self.arguments,
        )
    }
}

/// Contrat d'un service hébergé par un root device.
pub trait ServiceHost: Send + Sync {
    fn service_type(&self) -> ServiceType;

    /// Dispatch d'une action SOAP décodée. L'erreur est traduite en fault
    /// `<UPnPError>` par le root device.
    fn on_action(&self, request: &SoapAction) -> Result<ActionResponse, ServiceError>;

    /// Corps de la notification initiale (SEQ=0) : l'état complet courant.
    fn subscription_response(&self) -> String;

    /// Description SCPD servie à `desc.xml`.
    fn scpd_document(&self) -> ScpdDocument;
}

/// Stockage des variables d'état, indexé par InstanceID puis par variable.
///
/// L'instance 0 existe toujours ; les autres apparaissent à la première
/// écriture. Par instance, les variables gardent leur ordre de première
/// insertion.
#[derive(Debug)]
pub struct VariableStore<V: VariableKind> {
    variables: Mutex<BTreeMap<u32, Vec<(V, ServiceVariable)>>>,
}

impl<V: VariableKind> VariableStore<V> {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        map.insert(0, Vec::new());
        Self {
            variables: Mutex::new(map),
        }
    }

    pub fn set(&self, instance_id: u32, var: V, value: &str) {
        self.set_service_variable(instance_id, var, ServiceVariable::new(var.name(), value));
    }

    pub fn set_with_attribute(
        &self,
        instance_id: u32,
        var: V,
        value: &str,
        attr_name: &str,
        attr_value: &str,
    ) {
        self.set_service_variable(
            instance_id,
            var,
            ServiceVariable::new(var.name(), value).with_attribute(attr_name, attr_value),
        );
    }

    fn set_service_variable(&self, instance_id: u32, var: V, service_var: ServiceVariable) {
        let mut vars = self.variables.lock().unwrap();
        let instance = vars.entry(instance_id).or_default();
        match instance.iter().position(|(v, _)| *v == var) {
            Some(idx) => instance[idx].1 = service_var,
            None => instance.push((var, service_var)),
        }
    }

    pub fn get(&self, instance_id: u32, var: V) -> Option<ServiceVariable> {
        self.variables
            .lock()
            .unwrap()
            .get(&instance_id)
            .and_then(|instance| {
                instance
                    .iter()
                    .find(|(v, _)| *v == var)
                    .map(|(_, sv)| sv.clone())
            })
    }

    /// Valeur courante, chaîne vide si jamais écrite (la sémantique des
    /// getters AV : un champ non initialisé se lit vide, pas en erreur).
    pub fn value_of(&self, instance_id: u32, var: V) -> String {
        self.get(instance_id, var).map(|sv| sv.value).unwrap_or_default()
    }

    /// Toutes les variables d'une instance, dans l'ordre d'insertion.
    pub fn variables_of(&self, instance_id: u32) -> Vec<ServiceVariable> {
        self.variables
            .lock()
            .unwrap()
            .get(&instance_id)
            .map(|instance| instance.iter().map(|(_, sv)| sv.clone()).collect())
            .unwrap_or_default()
    }

    /// État complet, instances croissantes.
    pub fn all(&self) -> Vec<(u32, Vec<ServiceVariable>)> {
        self.variables
            .lock()
            .unwrap()
            .iter()
            .map(|(id, instance)| (*id, instance.iter().map(|(_, sv)| sv.clone()).collect()))
            .collect()
    }

    /// Paires nom → valeur d'une instance (pour GetStateVariables).
    pub fn named_values(&self, instance_id: u32) -> Vec<(String, String)> {
        self.variables
            .lock()
            .unwrap()
            .get(&instance_id)
            .map(|instance| {
                instance
                    .iter()
                    .map(|(_, sv)| (sv.name.clone(), sv.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl<V: VariableKind> Default for VariableStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Émet un événement mono-variable hors agrégation LastChange (positions,
/// compteurs, variables CM/CD évènementées directement).
pub fn notify_single_variable(
    publisher: &EventPublisher,
    service_type: ServiceType,
    var: &ServiceVariable,
) {
    let body = propertyset::build_single_property(&var.name, &var.value);
    publisher.notify(&service_type.urn_id_string(), &body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestVar {
        Alpha,
        Beta,
    }

    impl VariableKind for TestVar {
        fn name(self) -> &'static str {
            match self {
                TestVar::Alpha => "Alpha",
                TestVar::Beta => "Beta",
            }
        }

        fn from_name(name: &str) -> Option<Self> {
            match name {
                "Alpha" => Some(TestVar::Alpha),
                "Beta" => Some(TestVar::Beta),
                _ => None,
            }
        }
    }

    #[test]
    fn store_keeps_insertion_order_per_instance() {
        let store: VariableStore<TestVar> = VariableStore::new();
        store.set(0, TestVar::Beta, "b1");
        store.set(0, TestVar::Alpha, "a1");
        store.set(0, TestVar::Beta, "b2");

        let vars = store.variables_of(0);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "Beta");
        assert_eq!(vars[0].value, "b2");
        assert_eq!(vars[1].name, "Alpha");
    }

    #[test]
    fn default_instance_always_present() {
        let store: VariableStore<TestVar> = VariableStore::new();
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.value_of(0, TestVar::Alpha), "");
    }

    #[test]
    fn instances_appear_on_first_write() {
        let store: VariableStore<TestVar> = VariableStore::new();
        store.set(2, TestVar::Alpha, "x");
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].0, 2);
    }

    #[test]
    fn response_argument_order() {
        let mut response = ActionResponse::new("GetMediaInfo", ServiceType::av_transport(1));
        response.add_argument("NrTracks", "3");
        response.add_argument("MediaDuration", "00:10:00");

        let xml = response.to_soap_xml().unwrap();
        let tracks = xml.find("<NrTracks>").unwrap();
        let duration = xml.find("<MediaDuration>").unwrap();
        assert!(tracks < duration);
    }
}
