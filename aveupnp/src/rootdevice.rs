//! Root device : hébergement HTTP d'un device UPnP et de ses services.
//!
//! Pour chaque [`ServiceHost`] enregistré, trois endpoints sont servis :
//!
//! - `GET  /service/{Name}/desc.xml` - description SCPD
//! - `POST /service/{Name}/control`  - invocation d'actions SOAP
//! - `SUBSCRIBE|UNSUBSCRIBE /service/{Name}/event` - abonnements GENA
//!
//! La description du device est à `GET /description.xml` (la LOCATION des
//! annonces SSDP). L'annonceur SSDP et le balayage des abonnements expirés
//! démarrent avec le serveur.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::description::{build_device_description, ServedService};
use crate::errors::ServiceError;
use crate::gena::{format_timeout_header, parse_timeout_header, EventPublisher, NT_UPNP_EVENT};
use crate::services::ServiceHost;
use crate::soap::{build_soap_fault, generic_error_description, parse_soap_action};
use crate::ssdp::{SsdpAnnouncement, SsdpServer};
use crate::types::DeviceType;

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] xmltree::Error),

    #[error("Device already started")]
    AlreadyStarted,
}

/// Configuration d'un root device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootDeviceConfig {
    pub friendly_name: String,

    /// UUID du device ; généré si absent (un vrai device le persiste pour
    /// garder un UDN stable).
    pub uuid: Option<String>,

    /// Interface réseau à annoncer ; première interface non-loopback sinon.
    pub interface_name: Option<String>,

    /// Port HTTP (0 = éphémère).
    pub http_port: u16,

    /// Période entre annonces SSDP du root device.
    pub advertise_interval_secs: u64,

    /// Désactivable pour servir sans annoncer (device derrière un proxy
    /// SSDP, bancs de test).
    pub announce: bool,

    /// En-tête SERVER des annonces.
    pub server_header: String,
}

impl Default for RootDeviceConfig {
    fn default() -> Self {
        Self {
            friendly_name: "AVE Device".to_string(),
            uuid: None,
            interface_name: None,
            http_port: 0,
            advertise_interval_secs: 1800,
            announce: true,
            server_header: format!(
                "{}/{} UPnP/1.1 AVE/{}",
                std::env::consts::OS,
                "1.0",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

struct Started {
    base_url: String,
    ssdp: SsdpServer,
    server_task: tokio::task::JoinHandle<()>,
    sweeper_task: tokio::task::JoinHandle<()>,
}

/// Un device UPnP hébergé : description, services, annonces, événements.
pub struct RootDevice {
    config: RootDeviceConfig,
    device_type: DeviceType,
    uuid: String,
    publisher: EventPublisher,
    services: Mutex<Vec<Arc<dyn ServiceHost>>>,
    started: RwLock<Option<Started>>,
}

impl RootDevice {
    /// Crée le device (et son publisher GENA ; un runtime tokio doit être
    /// courant).
    pub fn new(device_type: DeviceType, config: RootDeviceConfig) -> Self {
        let uuid = config
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            config,
            device_type,
            uuid,
            publisher: EventPublisher::new(),
            services: Mutex::new(Vec::new()),
            started: RwLock::new(None),
        }
    }

    /// UDN complet (`uuid:…`).
    pub fn udn(&self) -> String {
        format!("uuid:{}", self.uuid)
    }

    /// Publisher GENA partagé, à passer aux constructeurs de services.
    pub fn event_publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// URL de la description une fois démarré.
    pub fn location(&self) -> Option<String> {
        self.started
            .read()
            .unwrap()
            .as_ref()
            .map(|s| format!("{}/description.xml", s.base_url))
    }

    /// Enregistre un service. À faire avant `start`.
    pub fn host_service(&self, host: Arc<dyn ServiceHost>) {
        self.services.lock().unwrap().push(host);
    }

    /// Publie un propertyset vers les abonnés d'un service.
    ///
    /// Interface unique à corps sérialisé : les services l'utilisent via
    /// leur publisher, les embarqueurs peuvent aussi l'appeler directement.
    pub fn notify_event(&self, service_id: &str, body: String) {
        self.publisher.notify(service_id, &body);
    }

    /// Démarre le serveur HTTP, l'annonceur SSDP et le sweeper GENA.
    pub async fn start(&self) -> Result<(), DeviceError> {
        if self.started.read().unwrap().is_some() {
            return Err(DeviceError::AlreadyStarted);
        }

        let listener =
            tokio::net::TcpListener::bind(("0.0.0.0", self.config.http_port)).await?;
        let port = listener.local_addr()?.port();
        let ip = pick_interface_ip(self.config.interface_name.as_deref())
            .unwrap_or_else(|| "127.0.0.1".parse().unwrap());
        let base_url = format!("http://{}:{}", ip, port);

        let services = self.services.lock().unwrap().clone();
        let router = self.build_router(&base_url, &services)?;

        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP server stopped: {}", e);
            }
        });

        let sweeper_task = self.publisher.start_sweeper();

        let mut ssdp = SsdpServer::new(Duration::from_secs(self.config.advertise_interval_secs));
        if self.config.announce {
            ssdp.start()?;

            let mut announcement = SsdpAnnouncement::new(
                self.uuid.clone(),
                self.device_type.urn_type_string(),
                format!("{}/description.xml", base_url),
                self.config.server_header.clone(),
            );
            for host in &services {
                announcement.add_notification_type(host.service_type().urn_type_string());
            }
            ssdp.add_device(announcement);
        }

        info!(
            "✅ Root device {} ({}) serving at {}/description.xml",
            self.config.friendly_name, self.device_type, base_url
        );

        *self.started.write().unwrap() = Some(Started {
            base_url,
            ssdp,
            server_task,
            sweeper_task,
        });

        Ok(())
    }

    /// Arrête tout : byebye SSDP, serveur HTTP, sweeper.
    pub fn stop(&self) {
        let Some(mut started) = self.started.write().unwrap().take() else {
            return;
        };
        started.ssdp.stop();
        started.server_task.abort();
        started.sweeper_task.abort();
        info!("👋 Root device {} stopped", self.config.friendly_name);
    }

    fn build_router(
        &self,
        base_url: &str,
        services: &[Arc<dyn ServiceHost>],
    ) -> Result<Router, DeviceError> {
        let served: Vec<ServedService> = services
            .iter()
            .map(|host| {
                let name = host.service_type().type_string().to_string();
                ServedService {
                    service_type: host.service_type(),
                    scpd_route: format!("/service/{}/desc.xml", name),
                    control_route: format!("/service/{}/control", name),
                    event_route: format!("/service/{}/event", name),
                }
            })
            .collect();

        let description = build_device_description(
            self.device_type,
            &self.udn(),
            &self.config.friendly_name,
            base_url,
            &served,
        )?;

        let mut router = Router::new().route(
            "/description.xml",
            get(move || {
                let description = description.clone();
                async move { xml_response(StatusCode::OK, description) }
            }),
        );

        for (host, routes) in services.iter().zip(&served) {
            let scpd_host = Arc::clone(host);
            router = router.route(
                &routes.scpd_route,
                get(move || {
                    let host = Arc::clone(&scpd_host);
                    async move { scpd_handler(host) }
                }),
            );

            let control_state = ControlState {
                host: Arc::clone(host),
            };
            router = router.route(
                &routes.control_route,
                post(control_handler).with_state(control_state),
            );

            let event_state = EventState {
                host: Arc::clone(host),
                publisher: self.publisher.clone(),
            };
            router = router.route(
                &routes.event_route,
                any(event_handler).with_state(event_state),
            );
        }

        Ok(router)
    }
}

impl Drop for RootDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Première adresse IPv4 utilisable, en privilégiant l'interface demandée.
fn pick_interface_ip(interface_name: Option<&str>) -> Option<IpAddr> {
    let interfaces = get_if_addrs::get_if_addrs().ok()?;
    for iface in &interfaces {
        let IpAddr::V4(v4) = iface.ip() else {
            continue;
        };
        if let Some(wanted) = interface_name {
            if iface.name == wanted {
                return Some(IpAddr::V4(v4));
            }
        } else if !v4.is_loopback() {
            return Some(IpAddr::V4(v4));
        }
    }
    None
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

fn scpd_handler(host: Arc<dyn ServiceHost>) -> Response {
    match host.scpd_document().to_xml_string() {
        Ok(xml) => xml_response(StatusCode::OK, xml),
        Err(e) => {
            error!("Failed to serialize SCPD: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Clone)]
struct ControlState {
    host: Arc<dyn ServiceHost>,
}

/// Endpoint de contrôle SOAP : 200 avec la réponse, ou 500 avec un fault
/// `<UPnPError>` portant le code de l'erreur.
async fn control_handler(State(state): State<ControlState>, body: String) -> Response {
    let request = match parse_soap_action(body.as_bytes()) {
        Ok(request) => request,
        Err(e) => {
            warn!("Unparseable SOAP request: {}", e);
            return fault_response(401, "Invalid action");
        }
    };

    info!(
        "📡 {} action {} requested",
        state.host.service_type().type_string(),
        request.name
    );

    match state.host.on_action(&request) {
        Ok(response) => match response.to_soap_xml() {
            Ok(xml) => xml_response(StatusCode::OK, xml),
            Err(e) => {
                error!("Failed to serialize action response: {}", e);
                fault_response(501, "Action failed")
            }
        },
        Err(e) => {
            let code = e.error_code();
            let description = fault_description(&e);
            fault_response(code, &description)
        }
    }
}

fn fault_description(error: &ServiceError) -> String {
    match error {
        ServiceError::Upnp { description, .. } => description.clone(),
        other => generic_error_description(other.error_code())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn fault_response(code: u32, description: &str) -> Response {
    match build_soap_fault("s:Client", "UPnPError", Some(code), Some(description)) {
        Ok(xml) => xml_response(StatusCode::INTERNAL_SERVER_ERROR, xml),
        Err(e) => {
            error!("Failed to serialize SOAP fault: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Clone)]
struct EventState {
    host: Arc<dyn ServiceHost>,
    publisher: EventPublisher,
}

/// Endpoint d'abonnement GENA (SUBSCRIBE / UNSUBSCRIBE).
async fn event_handler(
    State(state): State<EventState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let service_id = state.host.service_type().urn_id_string();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    match method.as_str() {
        "SUBSCRIBE" => {
            let sid = header("SID");
            let requested_timeout = header("TIMEOUT").and_then(parse_timeout_header);

            let response = match sid {
                None => {
                    // Nouvel abonnement : CALLBACK et NT exigés.
                    let Some(callback) = header("CALLBACK") else {
                        return StatusCode::PRECONDITION_FAILED.into_response();
                    };
                    if header("NT") != Some(NT_UPNP_EVENT) {
                        return StatusCode::PRECONDITION_FAILED.into_response();
                    }

                    state.publisher.subscribe(
                        &service_id,
                        callback,
                        requested_timeout,
                        state.host.subscription_response(),
                    )
                }
                Some(sid) => match state.publisher.renew(sid, requested_timeout) {
                    Some(timeout) => crate::gena::SubscribeResponse {
                        sid: sid.to_string(),
                        timeout,
                    },
                    None => return StatusCode::PRECONDITION_FAILED.into_response(),
                },
            };

            (
                StatusCode::OK,
                [
                    (
                        HeaderName::from_static("sid"),
                        HeaderValue::from_str(&response.sid).unwrap(),
                    ),
                    (
                        HeaderName::from_static("timeout"),
                        HeaderValue::from_str(&format_timeout_header(response.timeout)).unwrap(),
                    ),
                ],
            )
                .into_response()
        }
        "UNSUBSCRIBE" => match header("SID") {
            Some(sid) => {
                if state.publisher.unsubscribe(sid) {
                    StatusCode::OK.into_response()
                } else {
                    StatusCode::PRECONDITION_FAILED.into_response()
                }
            }
            None => StatusCode::PRECONDITION_FAILED.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_ephemeral() {
        let config = RootDeviceConfig::default();
        assert_eq!(config.http_port, 0);
        assert_eq!(config.advertise_interval_secs, 1800);
        assert!(config.server_header.contains("UPnP/1.1"));
    }

    #[tokio::test]
    async fn udn_is_stable_and_prefixed() {
        let device = RootDevice::new(DeviceType::media_renderer(1), RootDeviceConfig::default());
        let udn = device.udn();
        assert!(udn.starts_with("uuid:"));
        assert_eq!(device.udn(), udn);
    }

    #[tokio::test]
    async fn configured_uuid_is_kept() {
        let config = RootDeviceConfig {
            uuid: Some("12345678-1234-1234-1234-123456789abc".to_string()),
            ..RootDeviceConfig::default()
        };
        let device = RootDevice::new(DeviceType::media_renderer(1), config);
        assert_eq!(device.udn(), "uuid:12345678-1234-1234-1234-123456789abc");
    }
}
