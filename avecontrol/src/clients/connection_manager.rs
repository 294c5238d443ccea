//! Client ConnectionManager (négociation de protocole et cycle de vie des
//! connexions).

use aveupnp::services::connectionmanager::{Action, Variable};
pub use aveupnp::services::connectionmanager::PreparedConnection;
use aveupnp::services::VariableKind;
use aveupnp::types::ServiceType;

use crate::description::Device;
use crate::errors::ControlError;
use crate::service_client::{ServiceClient, ServiceTraits};
use crate::soap_client::response_text;
use crate::subscriptions::EventRuntime;

pub struct ConnectionManagerTraits;

impl ServiceTraits for ConnectionManagerTraits {
    type Action = Action;
    type Variable = Variable;

    fn service_type() -> ServiceType {
        ServiceType::connection_manager(1)
    }

    fn action_name(action: Action) -> &'static str {
        action.name()
    }

    fn action_from_name(name: &str) -> Option<Action> {
        Action::from_name(name)
    }

    fn variable_name(var: Variable) -> &'static str {
        var.name()
    }

    fn variable_from_name(name: &str) -> Option<Variable> {
        Variable::from_name(name)
    }

    fn handle_upnp_result(code: u32, description: &str) -> ControlError {
        connection_manager_upnp_result(code, description)
    }
}

/// Table des codes ConnectionManager.
pub fn connection_manager_upnp_result(code: u32, description: &str) -> ControlError {
    let message = match code {
        701 => "Incompatible protocol info",
        702 => "Incompatible directions",
        703 => "Insufficient network resources",
        704 => "Local restrictions",
        705 => "Access denied",
        706 => "Invalid connection reference",
        707 => "Managers are not part of the same network",
        _ => return crate::service_client::generic_upnp_result(code, description),
    };
    ControlError::Upnp(code, message.to_string())
}

/// Protocoles annoncés par le device (listes CSV décodées).
#[derive(Debug, Clone, Default)]
pub struct ProtocolInfo {
    pub source: Vec<String>,
    pub sink: Vec<String>,
}

impl ProtocolInfo {
    /// Vrai si le sink accepte ce protocolInfo exact ou via wildcard de
    /// format.
    pub fn sink_supports(&self, protocol_info: &str) -> bool {
        self.sink.iter().any(|entry| {
            entry == protocol_info || protocol_matches(entry, protocol_info)
        })
    }
}

fn protocol_matches(advertised: &str, wanted: &str) -> bool {
    let a: Vec<&str> = advertised.split(':').collect();
    let w: Vec<&str> = wanted.split(':').collect();
    if a.len() < 3 || w.len() < 3 {
        return false;
    }
    a[0] == w[0] && (a[2] == "*" || w[2] == "*" || a[2] == w[2])
}

/// Infos de connexion (GetCurrentConnectionInfo).
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub rcs_id: i32,
    pub av_transport_id: i32,
    pub protocol_info: String,
    pub peer_connection_manager: String,
    pub peer_connection_id: i32,
    pub direction: String,
    pub status: String,
}

/// Client du service ConnectionManager.
pub struct ConnectionManagerClient {
    client: ServiceClient<ConnectionManagerTraits>,
}

impl ConnectionManagerClient {
    pub fn new(runtime: EventRuntime) -> Self {
        Self {
            client: ServiceClient::new(runtime),
        }
    }

    pub fn set_device(&self, device: &Device) -> bool {
        self.client.set_device(device)
    }

    pub fn set_endpoints(&self, control_url: &str, event_sub_url: &str) {
        self.client.set_endpoints(control_url, event_sub_url);
    }

    pub fn get_protocol_info(&self) -> Result<ProtocolInfo, ControlError> {
        let response = self.client.execute(Action::GetProtocolInfo, &[])?;

        Ok(ProtocolInfo {
            source: split_csv(&response_text(&response, "Source")),
            sink: split_csv(&response_text(&response, "Sink")),
        })
    }

    pub fn get_current_connection_ids(&self) -> Result<Vec<i32>, ControlError> {
        let response = self.client.execute(Action::GetCurrentConnectionIDs, &[])?;
        Ok(response_text(&response, "ConnectionIDs")
            .split(',')
            .filter_map(|id| id.trim().parse::<i32>().ok())
            .collect())
    }

    /// Vrai si le device annonce PrepareForConnection dans son SCPD.
    ///
    /// La plupart des devices ne gèrent que la connexion implicite 0 : le
    /// control point ne tente prepare/complete que sur cette preuve, et se
    /// rabat sinon sur la connexion par défaut.
    pub fn supports_connection_preparation(&self) -> bool {
        self.client.advertises_action(Action::PrepareForConnection)
    }

    /// Négocie une connexion explicite pour le flux décrit.
    pub fn prepare_for_connection(
        &self,
        remote_protocol_info: &str,
        peer_connection_manager: &str,
        peer_connection_id: i32,
        direction: &str,
    ) -> Result<PreparedConnection, ControlError> {
        let peer_id = peer_connection_id.to_string();
        let response = self.client.execute(
            Action::PrepareForConnection,
            &[
                ("RemoteProtocolInfo", remote_protocol_info),
                ("PeerConnectionManager", peer_connection_manager),
                ("PeerConnectionID", peer_id.as_str()),
                ("Direction", direction),
            ],
        )?;

        Ok(PreparedConnection {
            connection_id: response_text(&response, "ConnectionID")
                .parse()
                .unwrap_or(-1),
            av_transport_id: response_text(&response, "AVTransportID")
                .parse()
                .unwrap_or(-1),
            rcs_id: response_text(&response, "RcsID").parse().unwrap_or(-1),
        })
    }

    /// Libère une connexion obtenue par [`prepare_for_connection`].
    ///
    /// [`prepare_for_connection`]: Self::prepare_for_connection
    pub fn connection_complete(&self, connection_id: i32) -> Result<(), ControlError> {
        let id = connection_id.to_string();
        self.client.execute(
            Action::ConnectionComplete,
            &[("ConnectionID", id.as_str())],
        )?;
        Ok(())
    }

    pub fn get_current_connection_info(
        &self,
        connection_id: i32,
    ) -> Result<ConnectionInfo, ControlError> {
        let id = connection_id.to_string();
        let response = self.client.execute(
            Action::GetCurrentConnectionInfo,
            &[("ConnectionID", id.as_str())],
        )?;

        Ok(ConnectionInfo {
            rcs_id: response_text(&response, "RcsID").parse().unwrap_or(-1),
            av_transport_id: response_text(&response, "AVTransportID")
                .parse()
                .unwrap_or(-1),
            protocol_info: response_text(&response, "ProtocolInfo"),
            peer_connection_manager: response_text(&response, "PeerConnectionManager"),
            peer_connection_id: response_text(&response, "PeerConnectionID")
                .parse()
                .unwrap_or(-1),
            direction: response_text(&response, "Direction"),
            status: response_text(&response, "Status"),
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_matching() {
        let info = ProtocolInfo {
            source: Vec::new(),
            sink: vec![
                "http-get:*:audio/flac:*".to_string(),
                "http-get:*:audio/mpeg:*".to_string(),
            ],
        };

        assert!(info.sink_supports("http-get:*:audio/flac:*"));
        assert!(info.sink_supports("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3"));
        assert!(!info.sink_supports("rtsp-rtp-udp:*:audio/flac:*"));
    }

    #[test]
    fn cm_fault_table() {
        assert!(matches!(
            connection_manager_upnp_result(701, ""),
            ControlError::Upnp(701, msg) if msg == "Incompatible protocol info"
        ));
    }
}
