//! # Module SOAP
//!
//! Construction et parsing des enveloppes SOAP utilisées par le contrôle
//! UPnP : requêtes d'action, réponses, et fautes `<UPnPError>`.
//!
//! L'ordre des arguments d'une action est significatif : certains devices
//! du terrain rejettent un corps SOAP dont les éléments sont réordonnés.
//! Toutes les APIs de ce module manipulent donc des listes ordonnées,
//! jamais des maps.

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use envelope::{find_child_with_suffix, SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{build_soap_fault, parse_upnp_error, UpnpFault};
pub use parser::{parse_soap_action, parse_soap_envelope, SoapAction, SoapParseError};

use crate::types::ServiceType;

/// Action UPnP prête à être envoyée à un endpoint de contrôle.
///
/// Les arguments sont sérialisés dans l'ordre des appels à
/// [`add_argument`](Action::add_argument).
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    url: String,
    service_type: ServiceType,
    arguments: Vec<(String, String)>,
}

impl Action {
    pub fn new(name: impl Into<String>, url: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
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

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn service_type_urn(&self) -> String {
        self.service_type.urn_type_string()
    }

    pub fn arguments(&self) -> &[(String, String)] {
        &self.arguments
    }

    /// Valeur de l'en-tête `SOAPACTION`, guillemets compris.
    pub fn soap_action_header(&self) -> String {
        format!(r#""{}#{}""#, self.service_type_urn(), self.name)
    }

    /// Corps SOAP complet de la requête.
    pub fn to_xml_string(&self) -> Result<String, xmltree::Error> {
        let args: Vec<(&str, &str)> = self
            .arguments
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        build_soap_request(&self.service_type_urn(), &self.name, &args)
    }
}

/// Codes d'erreur SOAP UPnP génériques.
pub mod error_codes {
    pub const INVALID_ACTION: u32 = 401;
    pub const INVALID_ARGS: u32 = 402;
    pub const ACTION_FAILED: u32 = 501;
    pub const ARGUMENT_VALUE_INVALID: u32 = 600;
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u32 = 601;
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u32 = 602;
    pub const OUT_OF_MEMORY: u32 = 603;
    pub const HUMAN_INTERVENTION_REQUIRED: u32 = 604;
    pub const STRING_ARGUMENT_TOO_LONG: u32 = 605;
}

/// Message associé à un code générique, `None` pour les codes inconnus ou
/// spécifiques à un service.
pub fn generic_error_description(code: u32) -> Option<&'static str> {
    match code {
        error_codes::INVALID_ACTION => Some("Invalid action"),
        error_codes::INVALID_ARGS => Some("Invalid arguments"),
        error_codes::ACTION_FAILED => Some("Action failed"),
        error_codes::ARGUMENT_VALUE_INVALID => Some("Argument value invalid"),
        error_codes::ARGUMENT_VALUE_OUT_OF_RANGE => Some("Argument value out of range"),
        error_codes::OPTIONAL_ACTION_NOT_IMPLEMENTED => Some("Optional action not implemented"),
        error_codes::OUT_OF_MEMORY => Some("Out of memory"),
        error_codes::HUMAN_INTERVENTION_REQUIRED => Some("Human intervention required"),
        error_codes::STRING_ARGUMENT_TOO_LONG => Some("String argument too long"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_preserves_argument_order() {
        let mut action = Action::new(
            "Play",
            "http://10.0.0.5/control",
            ServiceType::av_transport(1),
        );
        action.add_argument("InstanceID", "0");
        action.add_argument("Speed", "1");

        let xml = action.to_xml_string().unwrap();
        let instance = xml.find("<InstanceID>").unwrap();
        let speed = xml.find("<Speed>").unwrap();
        assert!(instance < speed);
    }

    #[test]
    fn soap_action_header_format() {
        let action = Action::new(
            "GetVolume",
            "http://10.0.0.5/control",
            ServiceType::rendering_control(1),
        );
        assert_eq!(
            action.soap_action_header(),
            r#""urn:schemas-upnp-org:service:RenderingControl:1#GetVolume""#
        );
    }
}
