//! # aveupnp - moteur de protocole UPnP AV
//!
//! Ce crate implémente les trois sous-systèmes du protocole UPnP AV :
//!
//! - ✅ SSDP : découverte multicast (annonces alive/byebye, M-SEARCH)
//! - ✅ GENA : abonnements aux événements et notifications séquencées
//! - ✅ SOAP : invocation d'actions et réponses/fautes UPnP
//!
//! La partie *device* (MediaRenderer / MediaServer) est hébergée par
//! [`rootdevice::RootDevice`] : description XML, endpoints de contrôle et
//! d'événements, annonces SSDP périodiques. La partie *control point*
//! (cache de découverte, clients de service typés) vit dans le crate
//! compagnon `avecontrol`, qui réutilise les types et helpers d'ici.

pub mod description;
pub mod errors;
pub mod gena;
pub mod lastchange;
pub mod rootdevice;
pub mod scpd;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod types;

pub use errors::ServiceError;
pub use rootdevice::{RootDevice, RootDeviceConfig};
pub use types::{
    DeviceKind, DeviceType, Property, ServiceKind, ServiceType, ServiceVariable, SubscriptionEvent,
};
