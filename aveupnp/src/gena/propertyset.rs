//! Corps `<e:propertyset>` des notifications GENA.

use std::io::BufReader;

use xmltree::{Element, XMLNode};

/// Namespace des propertysets d'événement.
pub const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Construit un propertyset avec une `<e:property>` par variable changée.
///
/// Les valeurs sont insérées comme contenu brut : un LastChange porte un
/// document XML interne déjà échappé par la sérialisation.
pub fn build_property_set(properties: &[(String, String)]) -> String {
    let mut body = format!(r#"<e:propertyset xmlns:e="{}">"#, EVENT_NS);
    for (name, value) in properties {
        body.push_str(&format!(
            "<e:property><{0}>{1}</{0}></e:property>",
            name,
            escape_text(value)
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

/// Propertyset à propriété unique.
pub fn build_single_property(name: &str, value: &str) -> String {
    build_property_set(&[(name.to_string(), value.to_string())])
}

/// Décode un propertyset en liste ordonnée (nom, valeur).
///
/// Les nœuds inattendus sont ignorés ; un NOTIFY partiellement malformé ne
/// doit jamais faire tomber le listener.
pub fn parse_property_set(xml: &[u8]) -> Result<Vec<(String, String)>, xmltree::ParseError> {
    let root = Element::parse(BufReader::new(xml))?;

    let mut properties = Vec::new();
    for property in element_children(&root) {
        for var in element_children(property) {
            let value = var.get_text().unwrap_or_default().to_string();
            properties.push((local_name(&var.name).to_string(), value));
        }
    }

    Ok(properties)
}

pub(crate) fn element_children(elem: &Element) -> impl Iterator<Item = &Element> {
    elem.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
