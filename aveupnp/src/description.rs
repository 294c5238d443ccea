//! Descripteurs de devices et construction de la description XML.
//!
//! [`Device`] et [`Service`] sont la vue control-point d'un device distant
//! (URLs résolues en absolu). [`build_device_description`] produit le
//! document servi par le root device à l'URL LOCATION annoncée en SSDP.

use std::collections::HashMap;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::types::{DeviceType, ServiceType};

/// Descripteur d'un service tel qu'exposé par une description de device.
///
/// Toutes les URLs sont absolues : la résolution contre `URLBase` (ou la
/// LOCATION) a lieu au parsing.
#[derive(Debug, Clone)]
pub struct Service {
    pub service_type: ServiceType,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
}

/// Descripteur d'un device distant.
#[derive(Debug, Clone)]
pub struct Device {
    /// Unique Device Name (`uuid:…`), clé du cache de découverte.
    pub udn: String,
    pub friendly_name: String,
    pub device_type: DeviceType,
    /// URL de la description (LOCATION de l'annonce SSDP).
    pub location: String,
    /// Base de résolution des URLs relatives.
    pub base_url: String,
    pub services: HashMap<ServiceType, Service>,
}

impl Device {
    pub fn implements_service(&self, service_type: ServiceType) -> bool {
        self.services.contains_key(&service_type)
    }

    pub fn service(&self, service_type: ServiceType) -> Option<&Service> {
        self.services.get(&service_type)
    }
}

/// Résout une URL éventuellement relative contre une URL de base.
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }

    // Extraire "scheme://host[:port]" de l'URL de base
    if let Some((scheme, rest)) = base_url.split_once("://") {
        let authority = rest.split('/').next().unwrap_or(rest);
        let base = format!("{}://{}", scheme, authority);

        if url.starts_with('/') {
            return format!("{}{}", base, url);
        }
        return format!("{}/{}", base, url);
    }

    url.to_string()
}

/// Entrée de service pour la construction de la description (routes
/// relatives, résolues par le control point).
#[derive(Debug, Clone)]
pub struct ServedService {
    pub service_type: ServiceType,
    pub scpd_route: String,
    pub control_route: String,
    pub event_route: String,
}

/// Construit le document `description.xml` d'un root device.
pub fn build_device_description(
    device_type: DeviceType,
    udn: &str,
    friendly_name: &str,
    base_url: &str,
    services: &[ServedService],
) -> Result<String, xmltree::Error> {
    let mut root = Element::new("root");
    root.attributes.insert(
        "xmlns".to_string(),
        "urn:schemas-upnp-org:device-1-0".to_string(),
    );

    let mut spec = Element::new("specVersion");
    spec.children.push(XMLNode::Element(text_element("major", "1")));
    spec.children.push(XMLNode::Element(text_element("minor", "0")));
    root.children.push(XMLNode::Element(spec));

    root.children
        .push(XMLNode::Element(text_element("URLBase", base_url)));

    let mut device = Element::new("device");
    device.children.push(XMLNode::Element(text_element(
        "deviceType",
        &device_type.urn_type_string(),
    )));
    device
        .children
        .push(XMLNode::Element(text_element("friendlyName", friendly_name)));
    device
        .children
        .push(XMLNode::Element(text_element("UDN", udn)));

    let mut service_list = Element::new("serviceList");
    for service in services {
        let mut elem = Element::new("service");
        elem.children.push(XMLNode::Element(text_element(
            "serviceType",
            &service.service_type.urn_type_string(),
        )));
        elem.children.push(XMLNode::Element(text_element(
            "serviceId",
            &service.service_type.urn_id_string(),
        )));
        elem.children.push(XMLNode::Element(text_element(
            "SCPDURL",
            &service.scpd_route,
        )));
        elem.children.push(XMLNode::Element(text_element(
            "controlURL",
            &service.control_route,
        )));
        elem.children.push(XMLNode::Element(text_element(
            "eventSubURL",
            &service.event_route,
        )));
        service_list.children.push(XMLNode::Element(elem));
    }
    device.children.push(XMLNode::Element(service_list));
    root.children.push(XMLNode::Element(device));

    let mut buf = Vec::new();
    let config = EmitterConfig::new().perform_indent(true).indent_string("  ");
    root.write_with_config(&mut buf, config)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}
