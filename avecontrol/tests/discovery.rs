//! Scénarios de découverte : alive -> Discovered, byebye -> Disappeared,
//! expiration TTL.

mod common;

use std::time::Duration;

use avecontrol::discovery::{DeviceTracker, DiscoveryEvent};
use avecontrol::{ControlPointConfig, DeviceType, ServiceType};
use aveupnp::ssdp::SsdpEvent;
use common::{StubResponse, StubServer};

const DESCRIPTION_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Test Renderer</friendlyName>
    <UDN>uuid:abc</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/service/AVTransport/desc.xml</SCPDURL>
        <controlURL>/service/AVTransport/control</controlURL>
        <eventSubURL>/service/AVTransport/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

fn from_addr() -> std::net::SocketAddr {
    "127.0.0.1:1900".parse().unwrap()
}

fn alive(location: &str, max_age: Option<u32>) -> SsdpEvent {
    SsdpEvent::Alive {
        usn: "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
        nt: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
        location: location.to_string(),
        server: "Test/1.0 UPnP/1.1".to_string(),
        max_age,
        from: from_addr(),
    }
}

#[test]
fn alive_discovers_device_and_byebye_evicts_it() {
    let server = StubServer::spawn(|_| StubResponse::ok(DESCRIPTION_XML));
    let tracker = DeviceTracker::new(ControlPointConfig::default());
    let events = tracker.events();

    tracker.handle_ssdp_event(alive(&server.url("/desc.xml"), Some(1800)));

    let event = events
        .recv_timeout(Duration::from_secs(5))
        .expect("expected Discovered event");
    match event {
        DiscoveryEvent::Discovered(device) => {
            assert_eq!(device.udn, "uuid:abc");
            assert_eq!(device.friendly_name, "Test Renderer");
            assert_eq!(device.device_type, DeviceType::media_renderer(1));
            assert!(device.implements_service(ServiceType::av_transport(1)));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(tracker.device_count(), 1);

    // Un second alive ne refait pas de fetch : TTL glissant seulement.
    tracker.handle_ssdp_event(alive(&server.url("/desc.xml"), Some(1800)));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(tracker.device_count(), 1);
    assert_eq!(server.requests().len(), 1);

    tracker.handle_ssdp_event(SsdpEvent::ByeBye {
        usn: "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
        nt: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
        from: from_addr(),
    });

    let event = events
        .recv_timeout(Duration::from_secs(2))
        .expect("expected Disappeared event");
    match event {
        DiscoveryEvent::Disappeared { udn } => assert_eq!(udn, "uuid:abc"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(tracker.device_count(), 0);

    tracker.shutdown();
}

#[test]
fn expired_entry_is_swept() {
    let server = StubServer::spawn(|_| StubResponse::ok(DESCRIPTION_XML));
    let tracker = DeviceTracker::new(ControlPointConfig::default());
    let events = tracker.events();

    tracker.handle_ssdp_event(alive(&server.url("/desc.xml"), Some(1)));

    match events.recv_timeout(Duration::from_secs(5)) {
        Ok(DiscoveryEvent::Discovered(_)) => {}
        other => panic!("unexpected event: {:?}", other),
    }

    std::thread::sleep(Duration::from_millis(1200));
    tracker.sweep_once();

    match events.recv_timeout(Duration::from_secs(2)) {
        Ok(DiscoveryEvent::Disappeared { udn }) => assert_eq!(udn, "uuid:abc"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(tracker.device_count(), 0);

    tracker.shutdown();
}

#[test]
fn expired_entry_is_never_returned() {
    let server = StubServer::spawn(|_| StubResponse::ok(DESCRIPTION_XML));
    let tracker = DeviceTracker::new(ControlPointConfig::default());
    let events = tracker.events();

    tracker.handle_ssdp_event(alive(&server.url("/desc.xml"), Some(1)));
    events
        .recv_timeout(Duration::from_secs(5))
        .expect("expected Discovered event");

    std::thread::sleep(Duration::from_millis(1200));

    // Sans passer par le sweeper : la lecture directe évince aussi.
    assert!(tracker.device("uuid:abc").is_none());
    assert_eq!(tracker.device_count(), 0);

    tracker.shutdown();
}

#[test]
fn alive_without_max_age_never_hits_the_network() {
    let server = StubServer::spawn(|_| StubResponse::ok(DESCRIPTION_XML));
    let tracker = DeviceTracker::new(ControlPointConfig::default());

    tracker.handle_ssdp_event(alive(&server.url("/desc.xml"), None));
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(tracker.device_count(), 0);
    assert!(server.requests().is_empty());

    tracker.shutdown();
}
