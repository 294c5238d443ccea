//! Service ConnectionManager hébergé.
//!
//! Pas de LastChange ici : SourceProtocolInfo, SinkProtocolInfo et
//! CurrentConnectionIDs sont événementées directement, une propriété par
//! changement.

use std::sync::Arc;

use crate::errors::ServiceError;
use crate::gena::propertyset::build_property_set;
use crate::gena::EventPublisher;
use crate::scpd::{arg_in, arg_out, ScpdAction, ScpdDocument, ScpdStateVariable};
use crate::soap::SoapAction;
use crate::types::ServiceType;

use super::{ActionResponse, ServiceHost, VariableKind, VariableStore};

/// Identifiant de connexion par défaut (connexion implicite toujours
/// présente).
pub const DEFAULT_CONNECTION_ID: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    SourceProtocolInfo,
    SinkProtocolInfo,
    CurrentConnectionIDs,
    ArgTypeConnectionStatus,
    ArgTypeConnectionManager,
    ArgTypeDirection,
    ArgTypeProtocolInfo,
    ArgTypeConnectionId,
    ArgTypeAVTransportId,
    ArgTypeRcsId,
}

impl VariableKind for Variable {
    fn name(self) -> &'static str {
        match self {
            Variable::SourceProtocolInfo => "SourceProtocolInfo",
            Variable::SinkProtocolInfo => "SinkProtocolInfo",
            Variable::CurrentConnectionIDs => "CurrentConnectionIDs",
            Variable::ArgTypeConnectionStatus => "A_ARG_TYPE_ConnectionStatus",
            Variable::ArgTypeConnectionManager => "A_ARG_TYPE_ConnectionManager",
            Variable::ArgTypeDirection => "A_ARG_TYPE_Direction",
            Variable::ArgTypeProtocolInfo => "A_ARG_TYPE_ProtocolInfo",
            Variable::ArgTypeConnectionId => "A_ARG_TYPE_ConnectionID",
            Variable::ArgTypeAVTransportId => "A_ARG_TYPE_AVTransportID",
            Variable::ArgTypeRcsId => "A_ARG_TYPE_RcsID",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SourceProtocolInfo" => Variable::SourceProtocolInfo,
            "SinkProtocolInfo" => Variable::SinkProtocolInfo,
            "CurrentConnectionIDs" => Variable::CurrentConnectionIDs,
            "A_ARG_TYPE_ConnectionStatus" => Variable::ArgTypeConnectionStatus,
            "A_ARG_TYPE_ConnectionManager" => Variable::ArgTypeConnectionManager,
            "A_ARG_TYPE_Direction" => Variable::ArgTypeDirection,
            "A_ARG_TYPE_ProtocolInfo" => Variable::ArgTypeProtocolInfo,
            "A_ARG_TYPE_ConnectionID" => Variable::ArgTypeConnectionId,
            "A_ARG_TYPE_AVTransportID" => Variable::ArgTypeAVTransportId,
            "A_ARG_TYPE_RcsID" => Variable::ArgTypeRcsId,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetProtocolInfo,
    PrepareForConnection,
    ConnectionComplete,
    GetCurrentConnectionIDs,
    GetCurrentConnectionInfo,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::GetProtocolInfo => "GetProtocolInfo",
            Action::PrepareForConnection => "PrepareForConnection",
            Action::ConnectionComplete => "ConnectionComplete",
            Action::GetCurrentConnectionIDs => "GetCurrentConnectionIDs",
            Action::GetCurrentConnectionInfo => "GetCurrentConnectionInfo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "GetProtocolInfo" => Action::GetProtocolInfo,
            "PrepareForConnection" => Action::PrepareForConnection,
            "ConnectionComplete" => Action::ConnectionComplete,
            "GetCurrentConnectionIDs" => Action::GetCurrentConnectionIDs,
            "GetCurrentConnectionInfo" => Action::GetCurrentConnectionInfo,
            _ => return None,
        })
    }
}

/// État d'une connexion rapporté par GetCurrentConnectionInfo.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub rcs_id: i32,
    pub av_transport_id: i32,
    pub protocol_info: String,
    pub peer_connection_manager: String,
    pub peer_connection_id: i32,
    pub direction: String,
    pub status: String,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            rcs_id: 0,
            av_transport_id: 0,
            protocol_info: String::new(),
            peer_connection_manager: String::new(),
            peer_connection_id: -1,
            direction: "Input".to_string(),
            status: "OK".to_string(),
        }
    }
}

/// Identifiants rendus par PrepareForConnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedConnection {
    pub connection_id: i32,
    pub av_transport_id: i32,
    pub rcs_id: i32,
}

/// Callbacks métier du gestionnaire de connexions.
pub trait ConnectionManagerHandler: Send + Sync {
    /// Infos de la connexion `connection_id`, ou `None` si elle n'existe
    /// pas (code 706).
    fn connection_info(&self, connection_id: i32) -> Option<ConnectionInfo>;

    /// Vrai si le device gère la préparation explicite de connexions.
    /// PrepareForConnection et ConnectionComplete ne figurent dans le SCPD
    /// que dans ce cas ; un control point ne doit les tenter que s'il les
    /// y voit.
    fn supports_connection_preparation(&self) -> bool {
        false
    }

    /// Alloue une connexion pour le flux décrit. Codes d'erreur attendus :
    /// 701 (protocole incompatible), 702 (direction incompatible),
    /// 703 (ressources insuffisantes).
    fn prepare_for_connection(
        &self,
        _remote_protocol_info: &str,
        _peer_connection_manager: &str,
        _peer_connection_id: i32,
        _direction: &str,
    ) -> Result<PreparedConnection, ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented(
            "PrepareForConnection".into(),
        ))
    }

    /// Libère une connexion allouée par `prepare_for_connection`.
    fn connection_complete(&self, _connection_id: i32) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented(
            "ConnectionComplete".into(),
        ))
    }
}

/// Handler minimal : une seule connexion implicite (id 0).
pub struct DefaultConnectionHandler;

impl ConnectionManagerHandler for DefaultConnectionHandler {
    fn connection_info(&self, connection_id: i32) -> Option<ConnectionInfo> {
        (connection_id == DEFAULT_CONNECTION_ID).then(ConnectionInfo::default)
    }
}

pub struct ConnectionManagerService {
    service_type: ServiceType,
    store: VariableStore<Variable>,
    handler: Arc<dyn ConnectionManagerHandler>,
    publisher: EventPublisher,
}

impl ConnectionManagerService {
    pub fn new(publisher: EventPublisher, handler: Arc<dyn ConnectionManagerHandler>) -> Arc<Self> {
        let service = Arc::new(Self {
            service_type: ServiceType::connection_manager(1),
            store: VariableStore::new(),
            handler,
            publisher,
        });

        service.store.set(
            0,
            Variable::CurrentConnectionIDs,
            &DEFAULT_CONNECTION_ID.to_string(),
        );

        service
    }

    /// Déclare les protocoles que le device sait consommer (renderer).
    pub fn set_sink_protocol_info(&self, protocol_info: &str) {
        self.set_and_notify(Variable::SinkProtocolInfo, protocol_info);
    }

    /// Déclare les protocoles que le device sait produire (server).
    pub fn set_source_protocol_info(&self, protocol_info: &str) {
        self.set_and_notify(Variable::SourceProtocolInfo, protocol_info);
    }

    fn set_and_notify(&self, var: Variable, value: &str) {
        self.store.set(0, var, value);
        if let Some(sv) = self.store.get(0, var) {
            super::notify_single_variable(&self.publisher, self.service_type, &sv);
        }
    }

    /// Identifiants de connexion courants (depuis la variable CSV).
    fn connection_ids(&self) -> Vec<i32> {
        self.store
            .value_of(0, Variable::CurrentConnectionIDs)
            .split(',')
            .filter_map(|id| id.trim().parse::<i32>().ok())
            .collect()
    }

    fn register_connection(&self, connection_id: i32) {
        let mut ids = self.connection_ids();
        if !ids.contains(&connection_id) {
            ids.push(connection_id);
        }
        self.set_connection_ids(&ids);
    }

    fn unregister_connection(&self, connection_id: i32) {
        let ids: Vec<i32> = self
            .connection_ids()
            .into_iter()
            .filter(|id| *id != connection_id)
            .collect();
        self.set_connection_ids(&ids);
    }

    fn set_connection_ids(&self, ids: &[i32]) {
        let csv = ids
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.set_and_notify(Variable::CurrentConnectionIDs, &csv);
    }
}

fn parse_i32_arg(request: &SoapAction, name: &str) -> Result<i32, ServiceError> {
    let raw = request.required_arg(name)?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| ServiceError::ArgumentValueInvalid(format!("{}: {}", name, raw)))
}

impl ServiceHost for ConnectionManagerService {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn on_action(&self, request: &SoapAction) -> Result<ActionResponse, ServiceError> {
        let action = Action::from_name(&request.name)
            .ok_or_else(|| ServiceError::InvalidAction(request.name.clone()))?;

        let mut response = ActionResponse::new(request.name.clone(), self.service_type);

        match action {
            Action::GetProtocolInfo => {
                response.add_argument(
                    "Source",
                    self.store.value_of(0, Variable::SourceProtocolInfo),
                );
                response.add_argument("Sink", self.store.value_of(0, Variable::SinkProtocolInfo));
            }
            Action::PrepareForConnection => {
                let prepared = self.handler.prepare_for_connection(
                    request.required_arg("RemoteProtocolInfo")?,
                    request.arg("PeerConnectionManager").unwrap_or_default(),
                    parse_i32_arg(request, "PeerConnectionID")?,
                    request.required_arg("Direction")?,
                )?;
                self.register_connection(prepared.connection_id);

                response.add_argument("ConnectionID", prepared.connection_id.to_string());
                response.add_argument("AVTransportID", prepared.av_transport_id.to_string());
                response.add_argument("RcsID", prepared.rcs_id.to_string());
            }
            Action::ConnectionComplete => {
                let id = parse_i32_arg(request, "ConnectionID")?;
                self.handler.connection_complete(id)?;
                self.unregister_connection(id);
            }
            Action::GetCurrentConnectionIDs => {
                response.add_argument(
                    "ConnectionIDs",
                    self.store.value_of(0, Variable::CurrentConnectionIDs),
                );
            }
            Action::GetCurrentConnectionInfo => {
                let id = parse_i32_arg(request, "ConnectionID")?;

                let info = self
                    .handler
                    .connection_info(id)
                    .ok_or_else(|| ServiceError::upnp(706, "Invalid connection reference"))?;

                response.add_argument("RcsID", info.rcs_id.to_string());
                response.add_argument("AVTransportID", info.av_transport_id.to_string());
                response.add_argument("ProtocolInfo", info.protocol_info);
                response.add_argument("PeerConnectionManager", info.peer_connection_manager);
                response.add_argument("PeerConnectionID", info.peer_connection_id.to_string());
                response.add_argument("Direction", info.direction);
                response.add_argument("Status", info.status);
            }
        }

        Ok(response)
    }

    fn subscription_response(&self) -> String {
        let properties: Vec<(String, String)> = self
            .store
            .variables_of(0)
            .into_iter()
            .map(|sv| (sv.name, sv.value))
            .collect();
        build_property_set(&properties)
    }

    fn scpd_document(&self) -> ScpdDocument {
        let mut actions = vec![ScpdAction {
            name: "GetProtocolInfo".into(),
            arguments: vec![
                arg_out("Source", "SourceProtocolInfo"),
                arg_out("Sink", "SinkProtocolInfo"),
            ],
        }];

        // Actions optionnelles : annoncées seulement si le handler les
        // implémente, pour que les control points puissent s'y fier.
        if self.handler.supports_connection_preparation() {
            actions.push(ScpdAction {
                name: "PrepareForConnection".into(),
                arguments: vec![
                    arg_in("RemoteProtocolInfo", "A_ARG_TYPE_ProtocolInfo"),
                    arg_in("PeerConnectionManager", "A_ARG_TYPE_ConnectionManager"),
                    arg_in("PeerConnectionID", "A_ARG_TYPE_ConnectionID"),
                    arg_in("Direction", "A_ARG_TYPE_Direction"),
                    arg_out("ConnectionID", "A_ARG_TYPE_ConnectionID"),
                    arg_out("AVTransportID", "A_ARG_TYPE_AVTransportID"),
                    arg_out("RcsID", "A_ARG_TYPE_RcsID"),
                ],
            });
            actions.push(ScpdAction {
                name: "ConnectionComplete".into(),
                arguments: vec![arg_in("ConnectionID", "A_ARG_TYPE_ConnectionID")],
            });
        }

        actions.push(ScpdAction {
            name: "GetCurrentConnectionIDs".into(),
            arguments: vec![arg_out("ConnectionIDs", "CurrentConnectionIDs")],
        });
        actions.push(ScpdAction {
            name: "GetCurrentConnectionInfo".into(),
            arguments: vec![
                arg_in("ConnectionID", "A_ARG_TYPE_ConnectionID"),
                arg_out("RcsID", "A_ARG_TYPE_RcsID"),
                arg_out("AVTransportID", "A_ARG_TYPE_AVTransportID"),
                arg_out("ProtocolInfo", "A_ARG_TYPE_ProtocolInfo"),
                arg_out("PeerConnectionManager", "A_ARG_TYPE_ConnectionManager"),
                arg_out("PeerConnectionID", "A_ARG_TYPE_ConnectionID"),
                arg_out("Direction", "A_ARG_TYPE_Direction"),
                arg_out("Status", "A_ARG_TYPE_ConnectionStatus"),
            ],
        });

        ScpdDocument {
            actions,
            state_variables: vec![
                evented_string("SourceProtocolInfo"),
                evented_string("SinkProtocolInfo"),
                evented_string("CurrentConnectionIDs"),
                plain_string("A_ARG_TYPE_ConnectionStatus"),
                plain_string("A_ARG_TYPE_ConnectionManager"),
                plain_string("A_ARG_TYPE_Direction"),
                plain_string("A_ARG_TYPE_ProtocolInfo"),
                plain_i4("A_ARG_TYPE_ConnectionID"),
                plain_i4("A_ARG_TYPE_AVTransportID"),
                plain_i4("A_ARG_TYPE_RcsID"),
            ],
        }
    }
}

fn evented_string(name: &str) -> ScpdStateVariable {
    ScpdStateVariable {
        name: name.to_string(),
        data_type: "string".to_string(),
        send_events: true,
        allowed_values: Vec::new(),
        default_value: None,
    }
}

fn plain_string(name: &str) -> ScpdStateVariable {
    ScpdStateVariable {
        name: name.to_string(),
        data_type: "string".to_string(),
        send_events: false,
        allowed_values: Vec::new(),
        default_value: None,
    }
}

fn plain_i4(name: &str) -> ScpdStateVariable {
    ScpdStateVariable {
        name: name.to_string(),
        data_type: "i4".to_string(),
        send_events: false,
        allowed_values: Vec::new(),
        default_value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_action;

    fn service() -> Arc<ConnectionManagerService> {
        ConnectionManagerService::new(EventPublisher::new(), Arc::new(DefaultConnectionHandler))
    }

    fn soap(action: &str, args: &str) -> SoapAction {
        let xml = format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:{0} xmlns:u="urn:schemas-upnp-org:service:ConnectionManager:1">{1}</u:{0}>
  </s:Body>
</s:Envelope>"#,
            action, args
        );
        parse_soap_action(xml.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn protocol_info_round_trip() {
        let service = service();
        service.set_sink_protocol_info("http-get:*:audio/flac:*,http-get:*:audio/mpeg:*");

        let response = service.on_action(&soap("GetProtocolInfo", "")).unwrap();
        assert_eq!(response.arguments()[0].0, "Source");
        assert_eq!(response.arguments()[1].0, "Sink");
        assert!(response.arguments()[1].1.contains("audio/flac"));
    }

    #[tokio::test]
    async fn unknown_connection_is_706() {
        let service = service();
        let request = soap(
            "GetCurrentConnectionInfo",
            "<ConnectionID>7</ConnectionID>",
        );
        let err = service.on_action(&request).unwrap_err();
        assert_eq!(err.error_code(), 706);
    }

    /// Handler qui alloue des connexions explicites séquentiellement.
    struct PreparingHandler {
        next_id: std::sync::atomic::AtomicI32,
    }

    impl PreparingHandler {
        fn new() -> Self {
            Self {
                next_id: std::sync::atomic::AtomicI32::new(1),
            }
        }
    }

    impl ConnectionManagerHandler for PreparingHandler {
        fn connection_info(&self, connection_id: i32) -> Option<ConnectionInfo> {
            (connection_id >= 0).then(ConnectionInfo::default)
        }

        fn supports_connection_preparation(&self) -> bool {
            true
        }

        fn prepare_for_connection(
            &self,
            remote_protocol_info: &str,
            _peer_connection_manager: &str,
            _peer_connection_id: i32,
            _direction: &str,
        ) -> Result<PreparedConnection, ServiceError> {
            if !remote_protocol_info.starts_with("http-get:") {
                return Err(ServiceError::upnp(701, "Incompatible protocol info"));
            }
            let id = self
                .next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(PreparedConnection {
                connection_id: id,
                av_transport_id: 0,
                rcs_id: 0,
            })
        }

        fn connection_complete(&self, _connection_id: i32) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn preparing_service() -> Arc<ConnectionManagerService> {
        ConnectionManagerService::new(EventPublisher::new(), Arc::new(PreparingHandler::new()))
    }

    fn prepare_request(protocol_info: &str) -> SoapAction {
        soap(
            "PrepareForConnection",
            &format!(
                "<RemoteProtocolInfo>{}</RemoteProtocolInfo>\
                 <PeerConnectionManager></PeerConnectionManager>\
                 <PeerConnectionID>-1</PeerConnectionID>\
                 <Direction>Input</Direction>",
                protocol_info
            ),
        )
    }

    #[tokio::test]
    async fn prepare_then_complete_tracks_connection_ids() {
        let service = preparing_service();

        let response = service
            .on_action(&prepare_request("http-get:*:audio/flac:*"))
            .unwrap();
        let names: Vec<&str> = response.arguments().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["ConnectionID", "AVTransportID", "RcsID"]);
        assert_eq!(response.arguments()[0].1, "1");

        let ids = service.on_action(&soap("GetCurrentConnectionIDs", "")).unwrap();
        assert_eq!(ids.arguments()[0].1, "0,1");

        let complete = soap("ConnectionComplete", "<ConnectionID>1</ConnectionID>");
        service.on_action(&complete).unwrap();

        let ids = service.on_action(&soap("GetCurrentConnectionIDs", "")).unwrap();
        assert_eq!(ids.arguments()[0].1, "0");
    }

    #[tokio::test]
    async fn prepare_with_bad_protocol_is_701() {
        let service = preparing_service();
        let err = service
            .on_action(&prepare_request("rtsp-rtp-udp:*:audio/flac:*"))
            .unwrap_err();
        assert_eq!(err.error_code(), 701);

        // L'échec ne laisse pas de connexion fantôme.
        let ids = service.on_action(&soap("GetCurrentConnectionIDs", "")).unwrap();
        assert_eq!(ids.arguments()[0].1, "0");
    }

    #[tokio::test]
    async fn prepare_without_handler_support_is_602() {
        let service = service();
        let err = service
            .on_action(&prepare_request("http-get:*:audio/flac:*"))
            .unwrap_err();
        assert_eq!(err.error_code(), 602);
    }

    #[tokio::test]
    async fn scpd_advertises_preparation_only_when_supported() {
        let plain: Vec<String> = service()
            .scpd_document()
            .action_names()
            .map(str::to_string)
            .collect();
        assert!(!plain.iter().any(|name| name == "PrepareForConnection"));
        assert!(!plain.iter().any(|name| name == "ConnectionComplete"));

        let preparing: Vec<String> = preparing_service()
            .scpd_document()
            .action_names()
            .map(str::to_string)
            .collect();
        assert!(preparing.iter().any(|name| name == "PrepareForConnection"));
        assert!(preparing.iter().any(|name| name == "ConnectionComplete"));
    }

    #[tokio::test]
    async fn default_connection_info() {
        let service = service();
        let request = soap(
            "GetCurrentConnectionInfo",
            "<ConnectionID>0</ConnectionID>",
        );
        let response = service.on_action(&request).unwrap();
        let names: Vec<&str> = response.arguments().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "RcsID",
                "AVTransportID",
                "ProtocolInfo",
                "PeerConnectionManager",
                "PeerConnectionID",
                "Direction",
                "Status"
            ]
        );
    }
}
