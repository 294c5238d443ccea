//! Parser SOAP pour actions UPnP.

use std::io::BufReader;

use xmltree::Element;

use super::{SoapBody, SoapEnvelope, SoapHeader};

/// Action UPnP extraite d'une enveloppe SOAP.
///
/// Les arguments sont conservés dans l'ordre du document.
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "Play", "SetAVTransportURI").
    pub name: String,

    /// Namespace de l'action (URN du service).
    pub namespace: Option<String>,

    /// Arguments dans l'ordre du corps SOAP.
    pub args: Vec<(String, String)>,
}

impl SoapAction {
    /// Valeur d'un argument par nom.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Argument obligatoire, en erreur descriptive sinon.
    pub fn required_arg(&self, name: &str) -> Result<&str, crate::ServiceError> {
        self.arg(name)
            .ok_or_else(|| crate::ServiceError::InvalidArgs(format!("missing argument {}", name)))
    }

    /// Argument `InstanceID` décodé ; toutes les actions AV en portent un.
    pub fn instance_id(&self) -> Result<u32, crate::ServiceError> {
        let raw = self.required_arg("InstanceID")?;
        raw.trim().parse::<u32>().map_err(|_| {
            crate::ServiceError::InvalidArgs(format!("InstanceID is not numeric: {}", raw))
        })
    }
}

/// Erreur de parsing SOAP.
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,
}

/// Parse une action SOAP à partir de bytes XML.
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    extract_action_from_body(&envelope.body)
}

/// Parse une enveloppe SOAP complète.
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = root
        .children
        .iter()
        .find_map(|n| n.as_element())
        .filter(|e| e.name.ends_with("Header"))
        .map(|e| SoapHeader { content: e.clone() });

    let body_elem = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

/// Extrait l'action UPnP du corps SOAP.
fn extract_action_from_body(body: &SoapBody) -> Result<SoapAction, SoapParseError> {
    // Le premier élément enfant du Body est l'action :
    // <u:ActionName xmlns:u="service-urn">...</u:ActionName>
    let action_elem = body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or(SoapParseError::NoAction)?;

    // "u:Play" -> "Play"
    let name = action_elem
        .name
        .rsplit(':')
        .next()
        .unwrap_or(&action_elem.name)
        .to_string();
    let namespace = action_elem.namespace.clone();

    let mut args = Vec::new();
    for child in &action_elem.children {
        if let Some(elem) = child.as_element() {
            let value = elem.get_text().unwrap_or_default().to_string();
            args.push((elem.name.clone(), value));
        }
    }

    Ok(SoapAction {
        name,
        namespace,
        args,
    })
}
