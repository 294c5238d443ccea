//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Découverte UPnP : datagrammes UDP au format HTTP sur le groupe
//! multicast 239.255.255.250:1900.
//!
//! Deux sockets distincts, jamais le même port :
//!
//! - le rôle *device* ([`SsdpServer`]) écoute sur 0.0.0.0:1900, rejoint le
//!   groupe multicast, annonce (alive/byebye) et répond aux M-SEARCH ;
//! - le rôle *control point* ([`SsdpClient`]) s'attache à un port éphémère
//!   pour émettre les M-SEARCH et recevoir les réponses unicast. S'il
//!   partageait le port 1900 avec un serveur local, le noyau répartirait
//!   les datagrammes entre les deux sockets et chacun perdrait la moitié
//!   des messages.

mod client;
mod server;

pub use client::{SsdpClient, SsdpEvent};
pub use server::{SsdpAnnouncement, SsdpServer};

/// Adresse multicast SSDP.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP.
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité annoncée (CACHE-CONTROL max-age, en secondes).
pub const MAX_AGE: u32 = 1800;

/// TTL multicast par défaut.
pub const MULTICAST_TTL: u32 = 4;

/// Valeur MX par défaut des M-SEARCH sortants.
pub const DEFAULT_SEARCH_MX: u32 = 2;
