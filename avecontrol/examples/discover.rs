//! Découverte des devices UPnP du réseau local.
//!
//! ```bash
//! cargo run --example discover
//! ```

use std::time::Duration;

use avecontrol::discovery::{DeviceTracker, DiscoveryEvent};
use avecontrol::ControlPointConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let tracker = DeviceTracker::new(ControlPointConfig::default());
    let events = tracker.events();

    tracker.start(&["ssdp:all".to_string()])?;

    println!("Searching for UPnP devices (15s)…");
    let deadline = std::time::Instant::now() + Duration::from_secs(15);

    loop {
        let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) else {
            break;
        };
        match events.recv_timeout(remaining) {
            Ok(DiscoveryEvent::Discovered(device)) => {
                println!(
                    "+ {:<40} {} [{}]",
                    device.friendly_name, device.udn, device.device_type
                );
                for service in device.services.values() {
                    println!("    - {}", service.service_type);
                }
            }
            Ok(DiscoveryEvent::Disappeared { udn }) => {
                println!("- {} disappeared", udn);
            }
            Err(_) => break,
        }
    }

    println!("\n{} device(s) in cache", tracker.device_count());
    tracker.shutdown();
    Ok(())
}
