//! Héberge un MediaRenderer minimal : AVTransport + RenderingControl +
//! ConnectionManager, annoncé en SSDP. Les actions de transport sont
//! simplement journalisées.
//!
//! ```bash
//! cargo run --example renderer
//! ```

use std::sync::Arc;
use std::time::Duration;

use aveupnp::services::avtransport::{AvTransportHandler, AvTransportService};
use aveupnp::services::connectionmanager::{ConnectionManagerService, DefaultConnectionHandler};
use aveupnp::services::renderingcontrol::{RenderingControlHandler, RenderingControlService};
use aveupnp::services::ServiceHost;
use aveupnp::types::DeviceType;
use aveupnp::{RootDevice, RootDeviceConfig, ServiceError};
use tracing::info;

struct LoggingTransport;

impl AvTransportHandler for LoggingTransport {
    fn set_av_transport_uri(&self, id: u32, uri: &str, _: &str) -> Result<(), ServiceError> {
        info!("instance {}: transport URI set to {}", id, uri);
        Ok(())
    }

    fn play(&self, id: u32, speed: &str) -> Result<(), ServiceError> {
        info!("instance {}: play at speed {}", id, speed);
        Ok(())
    }

    fn stop(&self, id: u32) -> Result<(), ServiceError> {
        info!("instance {}: stop", id);
        Ok(())
    }
}

struct LoggingVolume;

impl RenderingControlHandler for LoggingVolume {
    fn set_volume(&self, id: u32, channel: &str, volume: u16) -> Result<(), ServiceError> {
        info!("instance {}: {} volume -> {}", id, channel, volume);
        Ok(())
    }

    fn set_mute(&self, id: u32, channel: &str, mute: bool) -> Result<(), ServiceError> {
        info!("instance {}: {} mute -> {}", id, channel, mute);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RootDeviceConfig {
        friendly_name: "AVE Demo Renderer".to_string(),
        ..RootDeviceConfig::default()
    };
    let device = RootDevice::new(DeviceType::media_renderer(1), config);

    let min_interval = Duration::from_millis(200);
    let avtransport = AvTransportService::new(
        device.event_publisher(),
        Arc::new(LoggingTransport),
        min_interval,
    );
    let rendering = RenderingControlService::new(
        device.event_publisher(),
        Arc::new(LoggingVolume),
        min_interval,
    );
    let connection =
        ConnectionManagerService::new(device.event_publisher(), Arc::new(DefaultConnectionHandler));
    connection.set_sink_protocol_info("http-get:*:audio/flac:*,http-get:*:audio/mpeg:*");

    device.host_service(avtransport as Arc<dyn ServiceHost>);
    device.host_service(rendering as Arc<dyn ServiceHost>);
    device.host_service(connection as Arc<dyn ServiceHost>);

    device.start().await?;
    info!("Renderer running at {}", device.location().unwrap());

    tokio::signal::ctrl_c().await?;
    device.stop();
    Ok(())
}
