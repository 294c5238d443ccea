//! # avecontrol - control point UPnP AV
//!
//! Le rôle control point du moteur AVE :
//!
//! - découverte SSDP avec cache de devices à TTL ([`discovery`]) ;
//! - téléchargement et parsing des descriptions de devices ([`description`]) ;
//! - invocation d'actions SOAP ([`soap_client`]) ;
//! - abonnements GENA avec suivi des séquences ([`subscriptions`]) ;
//! - clients de service typés ([`clients`]) bâtis sur le framework
//!   générique de [`service_client`].
//!
//! Les types protocole (ServiceType, enveloppes SOAP, propertysets) sont
//! partagés avec le crate `aveupnp`.

pub mod clients;
pub mod description;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod service_client;
pub mod soap_client;
pub mod subscriptions;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use aveupnp::description::{Device, Service};
pub use aveupnp::types::{DeviceKind, DeviceType, ServiceKind, ServiceType, SubscriptionEvent};
pub use errors::ControlError;

/// Configuration d'un control point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPointConfig {
    /// Interface réseau pour le multicast SSDP.
    pub interface_name: Option<String>,

    /// MX des M-SEARCH sortants (fenêtre de réponse, en secondes).
    pub search_mx: u32,

    /// Timeout de téléchargement des descriptions et SCPD.
    pub description_timeout_secs: u64,

    /// TIMEOUT demandé pour les abonnements GENA (les clients de service
    /// peuvent le surcharger, AVTransport demande 1801 s).
    pub subscription_timeout_secs: u64,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            interface_name: None,
            search_mx: aveupnp::ssdp::DEFAULT_SEARCH_MX,
            description_timeout_secs: 5,
            subscription_timeout_secs: 300,
        }
    }
}

impl ControlPointConfig {
    pub fn description_timeout(&self) -> Duration {
        Duration::from_secs(self.description_timeout_secs)
    }

    pub fn subscription_timeout(&self) -> Duration {
        Duration::from_secs(self.subscription_timeout_secs)
    }
}
