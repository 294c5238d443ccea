//! Scénarios GENA côté subscriber : abonnement, notification initiale,
//! séquences, renouvellement, resynchronisation.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avecontrol::subscriptions::{EventRuntime, SubscriptionMessage};
use aveupnp::gena::propertyset::{build_single_property, parse_property_set};
use aveupnp::lastchange::parse_last_change_event;
use common::{send_notify, StubResponse, StubServer};

fn last_change_body(state: &str) -> String {
    let inner = format!(
        r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0"><TransportState val="{}"/></InstanceID></Event>"#,
        state
    );
    build_single_property("LastChange", &inner)
}

fn callback_of(server: &StubServer) -> String {
    let subscribes = server.requests_matching("SUBSCRIBE");
    let callback = subscribes[0].header("callback").expect("CALLBACK header");
    callback
        .trim()
        .trim_matches(|c| c == '<' || c == '>')
        .to_string()
}

#[test]
fn subscribe_then_decode_initial_notify() {
    let server = StubServer::spawn(|request| match request.method.as_str() {
        "SUBSCRIBE" => StubResponse::ok("")
            .with_header("SID", "uuid:sub1")
            .with_header("TIMEOUT", "Second-1800"),
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let subscription = runtime
        .subscribe(&server.url("/event"), Duration::from_secs(1800))
        .expect("subscribe");

    assert_eq!(subscription.initial_sid(), "uuid:sub1");

    let subscribe_request = &server.requests_matching("SUBSCRIBE")[0];
    assert_eq!(subscribe_request.header("nt"), Some("upnp:event"));
    assert_eq!(subscribe_request.header("timeout"), Some("Second-1800"));

    let callback = callback_of(&server);
    send_notify(&callback, "uuid:sub1", 0, &last_change_body("PLAYING"));

    let message = subscription
        .messages()
        .recv_timeout(Duration::from_secs(3))
        .expect("notify delivered");

    let SubscriptionMessage::Event(event) = message else {
        panic!("expected event message");
    };
    assert_eq!(event.sequence, 0);
    assert_eq!(event.sid, "uuid:sub1");

    let properties = parse_property_set(event.data.as_bytes()).unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].0, "LastChange");

    let instances = parse_last_change_event(properties[0].1.as_bytes()).unwrap();
    assert_eq!(instances[0].0, 0);
    assert_eq!(
        instances[0].1,
        vec![("TransportState".to_string(), "PLAYING".to_string())]
    );

    // La séquence suivante est livrée aussi.
    send_notify(&callback, "uuid:sub1", 1, &last_change_body("STOPPED"));
    let message = subscription
        .messages()
        .recv_timeout(Duration::from_secs(3))
        .expect("second notify delivered");
    let SubscriptionMessage::Event(event) = message else {
        panic!("expected event message");
    };
    assert_eq!(event.sequence, 1);

    runtime.shutdown();
}

#[test]
fn notify_with_unknown_sid_is_ignored() {
    let server = StubServer::spawn(|request| match request.method.as_str() {
        "SUBSCRIBE" => StubResponse::ok("")
            .with_header("SID", "uuid:sub1")
            .with_header("TIMEOUT", "Second-1800"),
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let subscription = runtime
        .subscribe(&server.url("/event"), Duration::from_secs(1800))
        .expect("subscribe");

    let callback = callback_of(&server);
    send_notify(&callback, "uuid:somebody-else", 0, &last_change_body("PLAYING"));

    assert!(subscription
        .messages()
        .recv_timeout(Duration::from_millis(700))
        .is_err());

    runtime.shutdown();
}

#[test]
fn renewal_keeps_sid_and_subscription_alive() {
    let server = StubServer::spawn(|request| match request.method.as_str() {
        // Le publisher n'accorde que 2 s : le worker renouvelle à ~1,6 s.
        "SUBSCRIBE" => StubResponse::ok("")
            .with_header("SID", "uuid:sub1")
            .with_header("TIMEOUT", "Second-2"),
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let subscription = runtime
        .subscribe(&server.url("/event"), Duration::from_secs(2))
        .expect("subscribe");

    std::thread::sleep(Duration::from_millis(2500));

    let subscribes = server.requests_matching("SUBSCRIBE");
    assert!(
        subscribes.len() >= 2,
        "expected a renewal SUBSCRIBE, got {}",
        subscribes.len()
    );

    let renewal = &subscribes[1];
    assert_eq!(renewal.header("sid"), Some("uuid:sub1"));
    assert!(renewal.header("callback").is_none());
    assert!(renewal.header("nt").is_none());

    // Toujours actif, même SID, pas de Lost.
    assert_eq!(subscription.sid().as_deref(), Some("uuid:sub1"));
    assert!(subscription
        .messages()
        .recv_timeout(Duration::from_millis(100))
        .is_err());

    runtime.shutdown();
}

#[test]
fn subscribe_response_without_sid_is_invalid() {
    let server = StubServer::spawn(|request| match request.method.as_str() {
        "SUBSCRIBE" => StubResponse::ok("").with_header("TIMEOUT", "Second-1800"),
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let result = runtime.subscribe(&server.url("/event"), Duration::from_secs(1800));

    assert!(matches!(
        result,
        Err(avecontrol::ControlError::InvalidResponse(_))
    ));

    runtime.shutdown();
}

#[test]
fn unsubscribe_is_idempotent() {
    let server = StubServer::spawn(|request| match request.method.as_str() {
        "SUBSCRIBE" => StubResponse::ok("")
            .with_header("SID", "uuid:sub1")
            .with_header("TIMEOUT", "Second-1800"),
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let subscription = runtime
        .subscribe(&server.url("/event"), Duration::from_secs(1800))
        .expect("subscribe");

    subscription.close();
    subscription.close();

    let unsubscribes = server.requests_matching("UNSUBSCRIBE");
    assert_eq!(unsubscribes.len(), 1);
    assert_eq!(unsubscribes[0].header("sid"), Some("uuid:sub1"));

    runtime.shutdown();
}

#[test]
fn seq_gap_triggers_resync() {
    let counter = Arc::new(AtomicU32::new(0));
    let issuing = Arc::clone(&counter);
    let server = StubServer::spawn(move |request| match request.method.as_str() {
        "SUBSCRIBE" if request.header("sid").is_none() => {
            let n = issuing.fetch_add(1, Ordering::SeqCst) + 1;
            StubResponse::ok("")
                .with_header("SID", &format!("uuid:sub{}", n))
                .with_header("TIMEOUT", "Second-1800")
        }
        _ => StubResponse::ok(""),
    });

    let runtime = EventRuntime::new().expect("event runtime");
    let subscription = runtime
        .subscribe(&server.url("/event"), Duration::from_secs(1800))
        .expect("subscribe");
    assert_eq!(subscription.initial_sid(), "uuid:sub1");

    let callback = callback_of(&server);
    send_notify(&callback, "uuid:sub1", 0, &last_change_body("PLAYING"));

    let SubscriptionMessage::Event(_) = subscription
        .messages()
        .recv_timeout(Duration::from_secs(3))
        .expect("initial notify")
    else {
        panic!("expected event");
    };

    // Trou de séquence : 0 puis 5.
    send_notify(&callback, "uuid:sub1", 5, &last_change_body("STOPPED"));

    std::thread::sleep(Duration::from_millis(1000));

    // Le subscriber s'est resynchronisé : unsubscribe + nouvel abonnement.
    assert_eq!(server.requests_matching("UNSUBSCRIBE").len(), 1);
    assert_eq!(server.requests_matching("SUBSCRIBE").len(), 2);
    assert_eq!(subscription.sid().as_deref(), Some("uuid:sub2"));

    // Le lot en trou n'a pas été livré.
    assert!(subscription
        .messages()
        .recv_timeout(Duration::from_millis(200))
        .is_err());

    runtime.shutdown();
}
