//! Structures de l'enveloppe SOAP.

use xmltree::Element;

/// Enveloppe SOAP complète.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// En-tête optionnel.
    pub header: Option<SoapHeader>,

    /// Corps contenant l'action, la réponse ou la faute.
    pub body: SoapBody,
}

/// En-tête SOAP.
#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

/// Corps SOAP.
#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

impl SoapEnvelope {
    pub fn new(body: SoapBody) -> Self {
        Self { header: None, body }
    }

    /// Premier élément du corps dont le nom (namespace ignoré) se termine
    /// par `suffix`. Les réponses du terrain préfixent librement (`u:`,
    /// `m:`, rien) ; on compare donc par suffixe.
    pub fn body_element_with_suffix(&self, suffix: &str) -> Option<&Element> {
        find_child_with_suffix(&self.body.content, suffix)
    }
}

/// Cherche un enfant direct dont le nom se termine par `suffix`.
pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        xmltree::XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}
