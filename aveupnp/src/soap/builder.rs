//! Construction des corps SOAP (requêtes et réponses).

use xmltree::{Element, EmitterConfig, XMLNode};

/// Construit une requête d'action SOAP.
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - Nom de l'action (ex: "Play")
/// * `args` - Arguments dans l'ordre d'émission
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let elem_name = format!("u:{}", action);
    let mut action_elem = Element::new(&elem_name);
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.to_string()));
        action_elem.children.push(XMLNode::Element(child));
    }

    serialize_in_envelope(action_elem)
}

/// Construit une réponse d'action SOAP (`<u:ActionResponse>`).
///
/// Les valeurs de retour sont émises dans l'ordre de la liste, conformément
/// à la déclaration d'arguments de l'action.
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(String, String)],
) -> Result<String, xmltree::Error> {
    let response_name = format!("u:{}Response", action);
    let mut response_elem = Element::new(&response_name);
    response_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in values {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.clone()));
        response_elem.children.push(XMLNode::Element(child));
    }

    serialize_in_envelope(response_elem)
}

/// Enrobe `content` dans `<s:Envelope><s:Body>` et sérialise.
fn serialize_in_envelope(content: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(content));

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
