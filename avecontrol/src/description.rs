//! Téléchargement et parsing des descriptions de devices.
//!
//! Le document est lu en streaming (quick-xml) : les descriptions du
//! terrain sont parfois volumineuses (icônes, devices embarqués) et on n'en
//! retient que l'identité du device et sa table de services, URLs résolues
//! en absolu.

use std::io::BufRead;
use std::time::Duration;

pub use aveupnp::description::{Device, Service};
use aveupnp::description::resolve_url;
use aveupnp::types::{DeviceType, ServiceKind, ServiceType};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, trace};
use ureq::Agent;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("Failed to read HTTP body: {0}")]
    HttpIo(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Missing required device element: {0}")]
    MissingField(&'static str),
}

/// Télécharge et parse la description à `location`.
///
/// `udn_hint` (dérivé de l'USN SSDP) sert de secours si le document ne
/// porte pas d'élément `<UDN>`.
pub fn fetch_device_description(
    udn_hint: &str,
    location: &str,
    timeout: Duration,
) -> Result<Device, DescriptionError> {
    debug!("Fetching description for {} at {}", udn_hint, location);

    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent: Agent = config.into();

    let response = agent.get(location).call()?;
    let (_parts, body) = response.into_parts();
    let reader = std::io::BufReader::new(body.into_reader());

    parse_device_description(reader, udn_hint, location)
}

/// Parse une description de device depuis un flux XML.
pub fn parse_device_description<R: BufRead>(
    source: R,
    udn_hint: &str,
    location: &str,
) -> Result<Device, DescriptionError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut udn: Option<String> = None;
    let mut friendly_name: Option<String> = None;
    let mut device_type: Option<String> = None;
    let mut url_base: Option<String> = None;

    let mut device_depth = 0usize;
    let mut in_service = false;
    let mut current_tag: Option<String> = None;

    // Champs du <service> en cours
    let mut service_type: Option<String> = None;
    let mut service_id: Option<String> = None;
    let mut control_url: Option<String> = None;
    let mut event_sub_url: Option<String> = None;
    let mut scpd_url: Option<String> = None;

    let mut services: Vec<Service> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "device" => {
                        device_depth += 1;
                        current_tag = None;
                    }
                    "service" => {
                        in_service = true;
                        current_tag = None;
                        service_type = None;
                        service_id = None;
                        control_url = None;
                        event_sub_url = None;
                        scpd_url = None;
                    }
                    _ => current_tag = Some(name),
                }
            }
            Event::Text(t) => {
                let Some(tag) = current_tag.as_deref() else {
                    continue;
                };
                let text = match t.unescape() {
                    Ok(cow) => cow.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };

                if in_service {
                    match tag {
                        "serviceType" => service_type = Some(text),
                        "serviceId" => service_id = Some(text),
                        "controlURL" => control_url = Some(text),
                        "eventSubURL" => event_sub_url = Some(text),
                        "SCPDURL" => scpd_url = Some(text),
                        _ => {}
                    }
                } else {
                    match tag {
                        // Identité du root device uniquement, pas des
                        // devices embarqués.
                        "UDN" if device_depth == 1 && udn.is_none() => udn = Some(text),
                        "friendlyName" if device_depth == 1 && friendly_name.is_none() => {
                            friendly_name = Some(text)
                        }
                        "deviceType" if device_depth == 1 && device_type.is_none() => {
                            device_type = Some(text)
                        }
                        "URLBase" => url_base = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "device" => device_depth = device_depth.saturating_sub(1),
                    "service" => {
                        if in_service {
                            in_service = false;
                            if let Some(service) = build_service(
                                location,
                                url_base.as_deref(),
                                service_type.take(),
                                service_id.take(),
                                control_url.take(),
                                event_sub_url.take(),
                                scpd_url.take(),
                            ) {
                                services.push(service);
                            }
                        }
                    }
                    _ => current_tag = None,
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let udn = udn.unwrap_or_else(|| udn_hint.to_string());
    if udn.is_empty() {
        return Err(DescriptionError::MissingField("UDN"));
    }

    let base_url = url_base.unwrap_or_else(|| location.to_string());
    let device_type = device_type
        .as_deref()
        .map(DeviceType::from_urn_type_string)
        .unwrap_or(DeviceType::new(aveupnp::types::DeviceKind::Unknown, 1));

    let mut device = Device {
        udn,
        friendly_name: friendly_name.unwrap_or_default(),
        device_type,
        location: location.to_string(),
        base_url,
        services: Default::default(),
    };

    for service in services {
        device.services.entry(service.service_type).or_insert(service);
    }

    debug!(
        "Parsed description of {} ({} services)",
        device.udn,
        device.services.len()
    );

    Ok(device)
}

#[allow(clippy::too_many_arguments)]
fn build_service(
    location: &str,
    url_base: Option<&str>,
    service_type: Option<String>,
    service_id: Option<String>,
    control_url: Option<String>,
    event_sub_url: Option<String>,
    scpd_url: Option<String>,
) -> Option<Service> {
    let type_urn = service_type?;
    let control_url = control_url?;
    let base = url_base.unwrap_or(location);

    let service_type = ServiceType::from_urn_type_string(&type_urn);
    if service_type.kind == ServiceKind::Unknown {
        trace!("Skipping unknown service type {}", type_urn);
        return None;
    }

    Some(Service {
        service_type,
        service_id: service_id.unwrap_or_else(|| service_type.urn_id_string()),
        control_url: resolve_url(base, &control_url),
        event_sub_url: resolve_url(base, &event_sub_url.unwrap_or_default()),
        scpd_url: resolve_url(base, &scpd_url.unwrap_or_default()),
    })
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERER_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <URLBase>http://10.0.0.5:8080</URLBase>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <UDN>uuid:12345678-1234-1234-1234-123456789abc</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/service/AVTransport/desc.xml</SCPDURL>
        <controlURL>/service/AVTransport/control</controlURL>
        <eventSubURL>/service/AVTransport/event</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/service/RenderingControl/desc.xml</SCPDURL>
        <controlURL>/service/RenderingControl/control</controlURL>
        <eventSubURL>/service/RenderingControl/event</eventSubURL>
      </service>
      <service>
        <serviceType>urn:other-vendor:service:Exotic:1</serviceType>
        <serviceId>urn:other-vendor:serviceId:Exotic</serviceId>
        <SCPDURL>/exotic.xml</SCPDURL>
        <controlURL>/exotic/control</controlURL>
        <eventSubURL>/exotic/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn parses_renderer_description() {
        let device = parse_device_description(
            RENDERER_XML.as_bytes(),
            "uuid:fallback",
            "http://10.0.0.5:8080/description.xml",
        )
        .unwrap();

        assert_eq!(device.udn, "uuid:12345678-1234-1234-1234-123456789abc");
        assert_eq!(device.friendly_name, "Living Room");
        assert_eq!(device.device_type, DeviceType::media_renderer(1));

        // Le service inconnu est filtré
        assert_eq!(device.services.len(), 2);

        let avt = device.service(ServiceType::av_transport(1)).unwrap();
        assert_eq!(
            avt.control_url,
            "http://10.0.0.5:8080/service/AVTransport/control"
        );
        assert_eq!(
            avt.event_sub_url,
            "http://10.0.0.5:8080/service/AVTransport/event"
        );
    }

    #[test]
    fn falls_back_to_udn_hint_and_location() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>NAS</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>cd.xml</SCPDURL>
        <controlURL>cd/control</controlURL>
        <eventSubURL>cd/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

        let device = parse_device_description(
            xml.as_bytes(),
            "uuid:from-ssdp",
            "http://10.0.0.9:9000/desc.xml",
        )
        .unwrap();

        assert_eq!(device.udn, "uuid:from-ssdp");
        let cd = device.service(ServiceType::content_directory(1)).unwrap();
        assert_eq!(cd.control_url, "http://10.0.0.9:9000/cd/control");
    }

    #[test]
    fn round_trips_with_engine_built_description() {
        let xml = aveupnp::description::build_device_description(
            DeviceType::media_renderer(1),
            "uuid:abc",
            "Test Renderer",
            "http://10.0.0.7:1234",
            &[aveupnp::description::ServedService {
                service_type: ServiceType::av_transport(1),
                scpd_route: "/service/AVTransport/desc.xml".to_string(),
                control_route: "/service/AVTransport/control".to_string(),
                event_route: "/service/AVTransport/event".to_string(),
            }],
        )
        .unwrap();

        let device = parse_device_description(
            xml.as_bytes(),
            "uuid:abc",
            "http://10.0.0.7:1234/description.xml",
        )
        .unwrap();

        assert_eq!(device.udn, "uuid:abc");
        assert!(device.implements_service(ServiceType::av_transport(1)));
        assert_eq!(
            device
                .service(ServiceType::av_transport(1))
                .unwrap()
                .control_url,
            "http://10.0.0.7:1234/service/AVTransport/control"
        );
    }
}
