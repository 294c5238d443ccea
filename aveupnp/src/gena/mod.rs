//! # Module GENA - General Event Notification Architecture
//!
//! Abonnements aux événements UPnP côté device : table des abonnés avec
//! compteurs de séquence, livraison des NOTIFY, et helpers communs aux
//! deux rôles (construction/parsing des propertysets, en-tête TIMEOUT).
//!
//! Le rôle *subscriber* (SUBSCRIBE sortant, réception des NOTIFY) est
//! implémenté par `avecontrol` avec ces mêmes helpers.

pub mod propertyset;
pub mod publisher;

use std::time::Duration;

pub use publisher::{EventPublisher, SubscribeResponse};

/// Valeur de l'en-tête NT des requêtes/notifications d'événement.
pub const NT_UPNP_EVENT: &str = "upnp:event";

/// Valeur de l'en-tête NTS des NOTIFY d'événement.
pub const NTS_PROPCHANGE: &str = "upnp:propchange";

/// Timeout d'abonnement accordé par défaut quand le subscriber n'en
/// demande pas (ou demande `infinite`).
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(1800);

/// Parse un en-tête `TIMEOUT: Second-N` (ou `Second-infinite`).
pub fn parse_timeout_header(raw: &str) -> Option<Duration> {
    let lower = raw.trim().to_ascii_lowercase();
    if lower == "second-infinite" {
        return Some(DEFAULT_SUBSCRIPTION_TIMEOUT);
    }
    let idx = lower.find("second-")?;
    let number = &lower[idx + 7..];
    number.parse::<u64>().ok().map(Duration::from_secs)
}

/// Formate la valeur d'un en-tête TIMEOUT.
pub fn format_timeout_header(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}
