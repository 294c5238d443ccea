//! Client SOAP bloquant pour l'invocation d'actions UPnP.

use std::time::Duration;

use aveupnp::soap::{parse_soap_envelope, parse_upnp_error, Action, SoapEnvelope};
use tracing::{debug, trace, warn};
use ureq::Agent;
use xmltree::Element;

use crate::errors::ControlError;

/// Timeout HTTP par défaut des appels d'action.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Résultat brut d'un appel SOAP :
/// - statut HTTP
/// - corps XML (toujours)
/// - enveloppe parsée si le parsing a réussi
pub struct SoapCallResult {
    pub status: u16,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Envoie une action SOAP sur son URL de contrôle.
pub fn invoke_action(action: &Action, timeout: Option<Duration>) -> Result<SoapCallResult, ControlError> {
    let body_xml = action
        .to_xml_string()
        .map_err(|e| ControlError::invalid_response(format!("SOAP build: {}", e)))?;

    debug!(
        url = action.url(),
        action = action.name(),
        service_type = %action.service_type_urn(),
        "Sending SOAP request"
    );
    trace!(body = body_xml.as_str(), "SOAP request body");

    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout.unwrap_or(DEFAULT_ACTION_TIMEOUT)))
        .build();
    let agent: Agent = config.into();

    let mut response = agent
        .post(action.url())
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPAction", &action.soap_action_header())
        .send(body_xml)?;

    let status = response.status().as_u16();
    debug!(status = status, "SOAP response received");

    let raw_body = response
        .body_mut()
        .read_to_string()
        .map_err(ControlError::from)?;

    // Le parsing de l'enveloppe est non fatal : on garde le corps brut.
    let envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

    if !(200..300).contains(&status) {
        warn!(
            url = action.url(),
            action = action.name(),
            status = status,
            body_snippet = %snippet(&raw_body),
            "SOAP call returned non-success status"
        );
    }

    Ok(SoapCallResult {
        status,
        raw_body,
        envelope,
    })
}

/// Appel complet : invoque l'action et extrait l'élément
/// `<{Action}Response>` ; les fautes deviennent des erreurs typées.
///
/// Le code de fault est remonté tel quel dans [`ControlError::Upnp`] ; les
/// clients de service le retraduisent avec leur table de messages.
pub fn execute_action(
    action: &Action,
    timeout: Option<Duration>,
) -> Result<Element, ControlError> {
    let result = invoke_action(action, timeout)?;

    if (200..300).contains(&result.status) {
        let envelope = result
            .envelope
            .as_ref()
            .ok_or_else(|| ControlError::invalid_response("unparseable SOAP response"))?;

        let response_name = format!("{}Response", action.name());
        return envelope
            .body_element_with_suffix(&response_name)
            .cloned()
            .ok_or_else(|| {
                ControlError::invalid_response(format!("missing {} element", response_name))
            });
    }

    if result.status == 500 {
        if let Some(fault) = result.envelope.as_ref().and_then(parse_upnp_error) {
            return Err(ControlError::Upnp(fault.error_code, fault.error_description));
        }
    }

    Err(ControlError::Http(result.status))
}

/// Texte d'un enfant direct de l'élément réponse (vide si absent).
pub fn response_text(response: &Element, name: &str) -> String {
    aveupnp::soap::find_child_with_suffix(response, name)
        .and_then(|e| e.get_text().map(|t| t.trim().to_string()))
        .unwrap_or_default()
}

/// Idem, mais l'absence est une erreur de réponse.
pub fn required_response_text(response: &Element, name: &str) -> Result<String, ControlError> {
    aveupnp::soap::find_child_with_suffix(response, name)
        .map(|e| {
            e.get_text()
                .map(|t| t.trim().to_string())
                .unwrap_or_default()
        })
        .ok_or_else(|| ControlError::invalid_response(format!("missing {} element", name)))
}

fn snippet(body: &str) -> String {
    const MAX_LEN: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= MAX_LEN {
        trimmed.to_string()
    } else {
        let mut end = MAX_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmltree::XMLNode;

    fn response_element() -> Element {
        let mut response = Element::new("u:GetVolumeResponse");
        let mut child = Element::new("CurrentVolume");
        child.children.push(XMLNode::Text("40".to_string()));
        response.children.push(XMLNode::Element(child));
        response
    }

    #[test]
    fn response_text_extracts_child() {
        let response = response_element();
        assert_eq!(response_text(&response, "CurrentVolume"), "40");
        assert_eq!(response_text(&response, "Missing"), "");
    }

    #[test]
    fn required_response_text_errors_on_missing() {
        let response = response_element();
        assert!(matches!(
            required_response_text(&response, "Missing"),
            Err(ControlError::InvalidResponse(_))
        ));
    }

    #[test]
    fn snippet_truncates() {
        let long = "x".repeat(1000);
        assert!(snippet(&long).len() < 300);
        assert_eq!(snippet("short"), "short");
    }
}
