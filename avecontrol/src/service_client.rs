//! Framework générique des clients de service.
//!
//! Chaque service concret fournit un [`ServiceTraits`] : ses deux petits
//! types somme (Action, Variable), leurs conversions texte, le timeout
//! d'abonnement et la table des codes d'erreur UPnP. Le
//! [`ServiceClient`] fait le reste : adoption du device, SCPD et actions
//! supportées, invocation SOAP, abonnement GENA et démultiplexage des
//! événements de variables (y compris le décodage LastChange par
//! InstanceID).

use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use aveupnp::description::{Device, Service};
use aveupnp::lastchange::parse_last_change_event;
use aveupnp::gena::propertyset::parse_property_set;
use aveupnp::scpd::{ScpdDocument, ScpdStateVariable};
use aveupnp::soap::Action as SoapActionRequest;
use aveupnp::types::ServiceType;
use tracing::{debug, info, warn};
use ureq::Agent;
use xmltree::Element;

use crate::errors::ControlError;
use crate::soap_client::execute_action;
use crate::subscriptions::{EventRuntime, Subscription, SubscriptionMessage};

const SCPD_TIMEOUT: Duration = Duration::from_secs(5);

/// Définition d'un service côté client.
pub trait ServiceTraits: Send + Sync + 'static {
    type Action: Copy + Eq + Hash + Send + Sync + 'static;
    type Variable: Copy + Eq + Hash + Send + Sync + 'static;

    fn service_type() -> ServiceType;

    fn action_name(action: Self::Action) -> &'static str;
    fn action_from_name(name: &str) -> Option<Self::Action>;
    fn variable_name(var: Self::Variable) -> &'static str;
    fn variable_from_name(name: &str) -> Option<Self::Variable>;

    /// TIMEOUT demandé au SUBSCRIBE.
    fn subscription_timeout() -> Duration {
        Duration::from_secs(300)
    }

    /// Traduit un code de fault UPnP en erreur descriptive. La valeur par
    /// défaut couvre les codes génériques 4xx/6xx.
    fn handle_upnp_result(code: u32, description: &str) -> ControlError {
        generic_upnp_result(code, description)
    }
}

/// Changement de variable décodé, typé par service.
#[derive(Debug, Clone)]
pub struct VariableEvent<V> {
    /// InstanceID porteur du changement (0 hors LastChange).
    pub instance_id: u32,

    /// La variable évènementée (LastChange pour les lots agrégés).
    pub changed: V,

    /// Variables décodées avec leur valeur, dans l'ordre du document.
    pub values: Vec<(V, String)>,
}

#[derive(Debug, Clone)]
struct Endpoints {
    control_url: String,
    event_sub_url: String,
}

/// Client générique d'un service UPnP distant.
pub struct ServiceClient<T: ServiceTraits> {
    runtime: EventRuntime,
    endpoints: Mutex<Option<Endpoints>>,
    supported_actions: Mutex<HashSet<T::Action>>,
    state_variables: Mutex<Vec<ScpdStateVariable>>,
    subscription: Mutex<Option<Arc<Subscription>>>,
    action_timeout: Mutex<Option<Duration>>,
    _marker: PhantomData<T>,
}

impl<T: ServiceTraits> ServiceClient<T> {
    pub fn new(runtime: EventRuntime) -> Self {
        Self {
            runtime,
            endpoints: Mutex::new(None),
            supported_actions: Mutex::new(HashSet::new()),
            state_variables: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            action_timeout: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    /// Timeout HTTP des actions (défaut : celui du client SOAP).
    pub fn set_action_timeout(&self, timeout: Duration) {
        *self.action_timeout.lock().unwrap() = Some(timeout);
    }

    /// Adopte un device s'il implémente ce service ; télécharge alors son
    /// SCPD pour calculer les actions supportées.
    ///
    /// Un SCPD illisible est journalisé et laisse le client utilisable
    /// avec un ensemble d'actions supportées vide.
    pub fn set_device(&self, device: &Device) -> bool {
        let Some(service) = device.service(T::service_type()) else {
            debug!(
                "Device {} does not implement {}",
                device.udn,
                T::service_type().type_string()
            );
            return false;
        };

        self.adopt_service(service);
        true
    }

    /// Variante directe pour les outils et les tests : URLs explicites,
    /// pas de SCPD.
    pub fn set_endpoints(&self, control_url: &str, event_sub_url: &str) {
        *self.endpoints.lock().unwrap() = Some(Endpoints {
            control_url: control_url.to_string(),
            event_sub_url: event_sub_url.to_string(),
        });
    }

    fn adopt_service(&self, service: &Service) {
        *self.endpoints.lock().unwrap() = Some(Endpoints {
            control_url: service.control_url.clone(),
            event_sub_url: service.event_sub_url.clone(),
        });

        match fetch_scpd(&service.scpd_url) {
            Ok(doc) => {
                let mut supported = HashSet::new();
                for name in doc.action_names() {
                    match T::action_from_name(name) {
                        Some(action) => {
                            supported.insert(action);
                        }
                        None => debug!("SCPD advertises unknown action {}", name),
                    }
                }
                info!(
                    "{}: {} supported actions, {} state variables",
                    T::service_type().type_string(),
                    supported.len(),
                    doc.state_variables.len()
                );
                *self.supported_actions.lock().unwrap() = supported;
                *self.state_variables.lock().unwrap() = doc.state_variables;
            }
            Err(e) => {
                warn!(
                    "Failed to read SCPD at {}: {} (continuing without action table)",
                    service.scpd_url, e
                );
                self.supported_actions.lock().unwrap().clear();
                self.state_variables.lock().unwrap().clear();
            }
        }
    }

    /// Vrai si le device annonce cette action (vrai aussi quand la table
    /// est vide, c'est-à-dire quand le SCPD n'a pas pu être lu).
    pub fn supports_action(&self, action: T::Action) -> bool {
        let supported = self.supported_actions.lock().unwrap();
        supported.is_empty() || supported.contains(&action)
    }

    /// Variante stricte : vrai uniquement si le SCPD lu annonce l'action.
    /// Sans SCPD, répond faux — à utiliser pour les actions optionnelles
    /// qu'on ne doit tenter que sur preuve (PrepareForConnection, …).
    pub fn advertises_action(&self, action: T::Action) -> bool {
        self.supported_actions.lock().unwrap().contains(&action)
    }

    /// Table des variables d'état du SCPD.
    pub fn state_variables(&self) -> Vec<ScpdStateVariable> {
        self.state_variables.lock().unwrap().clone()
    }

    /// Invoque une action et rend l'élément `<…Response>`.
    pub fn execute(
        &self,
        action: T::Action,
        args: &[(&str, &str)],
    ) -> Result<Element, ControlError> {
        let endpoints = self
            .endpoints
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ControlError::precondition("no device adopted"))?;

        if !self.supports_action(action) {
            return Err(ControlError::precondition(format!(
                "{} is not advertised by the device",
                T::action_name(action)
            )));
        }

        let mut request = SoapActionRequest::new(
            T::action_name(action),
            endpoints.control_url,
            T::service_type(),
        );
        for (name, value) in args {
            request.add_argument(*name, *value);
        }

        let timeout = *self.action_timeout.lock().unwrap();
        execute_action(&request, timeout).map_err(|e| match e {
            ControlError::Upnp(code, description) => T::handle_upnp_result(code, &description),
            other => other,
        })
    }

    /// S'abonne aux événements du service et démultiplexe les variables
    /// vers `listener`.
    ///
    /// Un abonnement existant est d'abord fermé. La perte définitive de
    /// l'abonnement (renouvellement et resynchronisation en échec) est
    /// journalisée et laisse l'état désabonné.
    pub fn subscribe(
        &self,
        listener: impl Fn(VariableEvent<T::Variable>) + Send + 'static,
    ) -> Result<(), ControlError> {
        self.unsubscribe();

        let endpoints = self
            .endpoints
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ControlError::precondition("no device adopted"))?;

        let subscription = Arc::new(
            self.runtime
                .subscribe(&endpoints.event_sub_url, T::subscription_timeout())?,
        );
        *self.subscription.lock().unwrap() = Some(Arc::clone(&subscription));

        let service_name = T::service_type().type_string();
        thread::spawn(move || {
            while let Ok(message) = subscription.messages().recv() {
                match message {
                    SubscriptionMessage::Event(event) => {
                        dispatch_event::<T>(&event.data, &listener);
                    }
                    SubscriptionMessage::Lost(reason) => {
                        warn!("{} subscription lost: {}", service_name, reason);
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Ferme l'abonnement. Idempotent, jamais en erreur.
    pub fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            subscription.close();
        }
    }

    /// SID de l'abonnement courant, s'il y en a un.
    pub fn subscription_sid(&self) -> Option<String> {
        self.subscription
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.sid())
    }
}

impl<T: ServiceTraits> Drop for ServiceClient<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Décode un corps de NOTIFY en événements typés.
fn dispatch_event<T: ServiceTraits>(
    body: &str,
    listener: &impl Fn(VariableEvent<T::Variable>),
) {
    let properties = match parse_property_set(body.as_bytes()) {
        Ok(props) => props,
        Err(e) => {
            warn!("Unparseable notify payload: {}", e);
            return;
        }
    };

    for (name, value) in properties {
        let Some(changed) = T::variable_from_name(&name) else {
            debug!("Unknown event variable {} ignored", name);
            continue;
        };

        if name == "LastChange" {
            let instances = match parse_last_change_event(value.as_bytes()) {
                Ok(instances) => instances,
                Err(e) => {
                    warn!("Unparseable LastChange document: {}", e);
                    continue;
                }
            };

            for (instance_id, vars) in instances {
                let mut values = Vec::new();
                for (var_name, var_value) in vars {
                    match T::variable_from_name(&var_name) {
                        Some(var) => values.push((var, var_value)),
                        None => debug!("Unknown LastChange variable {} ignored", var_name),
                    }
                }
                listener(VariableEvent {
                    instance_id,
                    changed,
                    values,
                });
            }
        } else {
            listener(VariableEvent {
                instance_id: 0,
                changed,
                values: vec![(changed, value)],
            });
        }
    }
}

fn fetch_scpd(url: &str) -> Result<ScpdDocument, ControlError> {
    let config = Agent::config_builder()
        .timeout_global(Some(SCPD_TIMEOUT))
        .build();
    let agent: Agent = config.into();

    let mut response = agent.get(url).call()?;
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(ControlError::from)?;

    ScpdDocument::parse(body.as_bytes())
        .map_err(|e| ControlError::invalid_response(format!("SCPD: {}", e)))
}

/// Table des codes d'erreur UPnP génériques.
pub fn generic_upnp_result(code: u32, description: &str) -> ControlError {
    let message = match code {
        401 => "Invalid action",
        402 => "Invalid arguments",
        501 => "Action failed",
        600 => "Argument value invalid",
        601 => "Argument value out of range",
        602 => "Optional action not implemented",
        603 => "Out of memory",
        604 => "Human intervention required",
        605 => "String argument too long",
        _ => {
            return ControlError::Upnp(
                code,
                if description.is_empty() {
                    format!("Unknown UPnP error {}", code)
                } else {
                    description.to_string()
                },
            )
        }
    };
    ControlError::Upnp(code, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct FakeTraits;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum FakeAction {
        Ping,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum FakeVariable {
        LastChange,
        TransportState,
        Volume,
    }

    impl ServiceTraits for FakeTraits {
        type Action = FakeAction;
        type Variable = FakeVariable;

        fn service_type() -> ServiceType {
            ServiceType::av_transport(1)
        }

        fn action_name(_: FakeAction) -> &'static str {
            "Ping"
        }

        fn action_from_name(name: &str) -> Option<FakeAction> {
            (name == "Ping").then_some(FakeAction::Ping)
        }

        fn variable_name(var: FakeVariable) -> &'static str {
            match var {
                FakeVariable::LastChange => "LastChange",
                FakeVariable::TransportState => "TransportState",
                FakeVariable::Volume => "Volume",
            }
        }

        fn variable_from_name(name: &str) -> Option<FakeVariable> {
            match name {
                "LastChange" => Some(FakeVariable::LastChange),
                "TransportState" => Some(FakeVariable::TransportState),
                "Volume" => Some(FakeVariable::Volume),
                _ => None,
            }
        }
    }

    #[test]
    fn dispatch_decodes_last_change_instances() {
        let inner = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0"><TransportState val="PLAYING"/><Volume val="40"/></InstanceID></Event>"#;
        let body = aveupnp::gena::propertyset::build_single_property("LastChange", inner);

        let (tx, rx) = mpsc::channel();
        dispatch_event::<FakeTraits>(&body, &move |event| {
            tx.send(event).unwrap();
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.instance_id, 0);
        assert_eq!(event.changed, FakeVariable::LastChange);
        assert_eq!(
            event.values,
            vec![
                (FakeVariable::TransportState, "PLAYING".to_string()),
                (FakeVariable::Volume, "40".to_string()),
            ]
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_passes_plain_variables() {
        let body = aveupnp::gena::propertyset::build_single_property("TransportState", "STOPPED");

        let (tx, rx) = mpsc::channel();
        dispatch_event::<FakeTraits>(&body, &move |event| {
            tx.send(event).unwrap();
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.changed, FakeVariable::TransportState);
        assert_eq!(
            event.values,
            vec![(FakeVariable::TransportState, "STOPPED".to_string())]
        );
    }

    #[test]
    fn dispatch_skips_unknown_variables() {
        let body = aveupnp::gena::propertyset::build_single_property("Mystery", "?");

        let (tx, rx) = mpsc::channel::<VariableEvent<FakeVariable>>();
        dispatch_event::<FakeTraits>(&body, &move |event| {
            tx.send(event).unwrap();
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn generic_upnp_table() {
        assert!(matches!(
            generic_upnp_result(401, ""),
            ControlError::Upnp(401, msg) if msg == "Invalid action"
        ));
        assert!(matches!(
            generic_upnp_result(799, "vendor specific"),
            ControlError::Upnp(799, msg) if msg == "vendor specific"
        ));
    }
}
