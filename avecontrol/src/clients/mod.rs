//! Clients de service typés, bâtis sur [`crate::service_client`].
//!
//! Les enums Action/Variable sont partagés avec les hôtes du crate
//! `aveupnp` : mêmes noms sur le fil, mêmes conversions.

mod avtransport;
mod connection_manager;
mod content_directory;
mod rendering_control;

pub use avtransport::{
    AvTransportClient, AvTransportTraits, MediaInfo, PositionInfo, TransportInfo,
};
pub use connection_manager::{
    ConnectionInfo, ConnectionManagerClient, PreparedConnection, ProtocolInfo,
};
pub use content_directory::{BrowseResponse, ContentDirectoryClient};
pub use rendering_control::RenderingControlClient;
