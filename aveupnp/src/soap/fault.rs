//! SOAP Faults et erreurs UPnP.

use xmltree::{Element, EmitterConfig, XMLNode};

use super::envelope::{find_child_with_suffix, SoapEnvelope};

/// Contenu du bloc `<UPnPError>` d'un fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    pub error_code: u32,
    pub error_description: String,
}

/// Construit un SOAP Fault complet (enveloppe comprise).
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message du fault
/// * `upnp_error_code` / `upnp_error_desc` - Détail `<UPnPError>` optionnel
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<u32>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");

    let mut faultcode_elem = Element::new("faultcode");
    faultcode_elem
        .children
        .push(XMLNode::Text(fault_code.to_string()));
    fault.children.push(XMLNode::Element(faultcode_elem));

    let mut faultstring_elem = Element::new("faultstring");
    faultstring_elem
        .children
        .push(XMLNode::Text(fault_string.to_string()));
    fault.children.push(XMLNode::Element(faultstring_elem));

    if let (Some(code), Some(desc)) = (upnp_error_code, upnp_error_desc) {
        let mut detail = Element::new("detail");

        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );

        let mut error_code_elem = Element::new("errorCode");
        error_code_elem
            .children
            .push(XMLNode::Text(code.to_string()));
        upnp_error.children.push(XMLNode::Element(error_code_elem));

        let mut error_desc_elem = Element::new("errorDescription");
        error_desc_elem
            .children
            .push(XMLNode::Text(desc.to_string()));
        upnp_error.children.push(XMLNode::Element(error_desc_elem));

        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new().perform_indent(true).indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extrait le `<UPnPError>` d'une enveloppe fault, s'il y en a un.
pub fn parse_upnp_error(envelope: &SoapEnvelope) -> Option<UpnpFault> {
    let fault = find_child_with_suffix(&envelope.body.content, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let error_code = find_child_with_suffix(upnp_error, "errorCode")?
        .get_text()?
        .trim()
        .parse::<u32>()
        .ok()?;

    let error_description = find_child_with_suffix(upnp_error, "errorDescription")
        .and_then(|e| e.get_text().map(|t| t.trim().to_string()))
        .unwrap_or_default();

    Some(UpnpFault {
        error_code,
        error_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_envelope;

    #[test]
    fn test_build_simple_fault() {
        let xml = build_soap_fault("s:Client", "Invalid Action", None, None).unwrap();

        assert!(xml.contains("<s:Fault>"));
        assert!(xml.contains("<faultcode>s:Client</faultcode>"));
        assert!(xml.contains("<faultstring>Invalid Action</faultstring>"));
        assert!(!xml.contains("UPnPError"));
    }

    #[test]
    fn test_fault_round_trip() {
        let xml = build_soap_fault(
            "s:Client",
            "UPnPError",
            Some(701),
            Some("Transition not available"),
        )
        .unwrap();

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let fault = parse_upnp_error(&envelope).unwrap();
        assert_eq!(fault.error_code, 701);
        assert_eq!(fault.error_description, "Transition not available");
    }

    #[test]
    fn test_no_fault_in_regular_response() {
        let xml = crate::soap::build_soap_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Stop",
            &[],
        )
        .unwrap();

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert!(parse_upnp_error(&envelope).is_none());
    }
}
