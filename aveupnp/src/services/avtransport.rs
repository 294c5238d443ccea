//! Service AVTransport hébergé (urn:schemas-upnp-org:service:AVTransport:1).
//!
//! Le moteur décode les actions SOAP, tient les variables d'état par
//! instance et alimente l'agrégateur LastChange ; la mécanique de lecture
//! réelle (play, seek, …) est déléguée au [`AvTransportHandler`] fourni
//! par l'embarqueur.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::ServiceError;
use crate::gena::propertyset::build_single_property;
use crate::gena::EventPublisher;
use crate::lastchange::{build_last_change_event, LastChangeVariable};
use crate::scpd::{arg_in, arg_out, ScpdAction, ScpdDocument, ScpdStateVariable};
use crate::soap::SoapAction;
use crate::types::{ServiceType, ServiceVariable};

use super::{ActionResponse, ServiceHost, VariableKind, VariableStore};

/// Timeout d'abonnement conseillé pour AVTransport.
pub const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(1801);

/// Variables d'état AVTransport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    TransportState,
    TransportStatus,
    PlaybackStorageMedium,
    RecordStorageMedium,
    PossiblePlaybackStorageMedia,
    PossibleRecordStorageMedia,
    CurrentPlayMode,
    TransportPlaySpeed,
    RecordMediumWriteStatus,
    CurrentRecordQualityMode,
    PossibleRecordQualityModes,
    NumberOfTracks,
    CurrentTrack,
    CurrentTrackDuration,
    CurrentMediaDuration,
    CurrentTrackMetaData,
    CurrentTrackURI,
    AVTransportURI,
    AVTransportURIMetaData,
    NextAVTransportURI,
    NextAVTransportURIMetaData,
    RelativeTimePosition,
    AbsoluteTimePosition,
    RelativeCounterPosition,
    AbsoluteCounterPosition,
    CurrentTransportActions,
    LastChange,
    ArgTypeSeekMode,
    ArgTypeSeekTarget,
    ArgTypeInstanceId,
}

impl VariableKind for Variable {
    fn name(self) -> &'static str {
        match self {
            Variable::TransportState => "TransportState",
            Variable::TransportStatus => "TransportStatus",
            Variable::PlaybackStorageMedium => "PlaybackStorageMedium",
            Variable::RecordStorageMedium => "RecordStorageMedium",
            Variable::PossiblePlaybackStorageMedia => "PossiblePlaybackStorageMedia",
            Variable::PossibleRecordStorageMedia => "PossibleRecordStorageMedia",
            Variable::CurrentPlayMode => "CurrentPlayMode",
            Variable::TransportPlaySpeed => "TransportPlaySpeed",
            Variable::RecordMediumWriteStatus => "RecordMediumWriteStatus",
            Variable::CurrentRecordQualityMode => "CurrentRecordQualityMode",
            Variable::PossibleRecordQualityModes => "PossibleRecordQualityModes",
            Variable::NumberOfTracks => "NumberOfTracks",
            Variable::CurrentTrack => "CurrentTrack",
            Variable::CurrentTrackDuration => "CurrentTrackDuration",
            Variable::CurrentMediaDuration => "CurrentMediaDuration",
            Variable::CurrentTrackMetaData => "CurrentTrackMetaData",
            Variable::CurrentTrackURI => "CurrentTrackURI",
            Variable::AVTransportURI => "AVTransportURI",
            Variable::AVTransportURIMetaData => "AVTransportURIMetaData",
            Variable::NextAVTransportURI => "NextAVTransportURI",
            Variable::NextAVTransportURIMetaData => "NextAVTransportURIMetaData",
            Variable::RelativeTimePosition => "RelativeTimePosition",
            Variable::AbsoluteTimePosition => "AbsoluteTimePosition",
            Variable::RelativeCounterPosition => "RelativeCounterPosition",
            Variable::AbsoluteCounterPosition => "AbsoluteCounterPosition",
            Variable::CurrentTransportActions => "CurrentTransportActions",
            Variable::LastChange => "LastChange",
            Variable::ArgTypeSeekMode => "A_ARG_TYPE_SeekMode",
            Variable::ArgTypeSeekTarget => "A_ARG_TYPE_SeekTarget",
            Variable::ArgTypeInstanceId => "A_ARG_TYPE_InstanceID",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "TransportState" => Variable::TransportState,
            "TransportStatus" => Variable::TransportStatus,
            "PlaybackStorageMedium" => Variable::PlaybackStorageMedium,
            "RecordStorageMedium" => Variable::RecordStorageMedium,
            "PossiblePlaybackStorageMedia" => Variable::PossiblePlaybackStorageMedia,
            "PossibleRecordStorageMedia" => Variable::PossibleRecordStorageMedia,
            "CurrentPlayMode" => Variable::CurrentPlayMode,
            "TransportPlaySpeed" => Variable::TransportPlaySpeed,
            "RecordMediumWriteStatus" => Variable::RecordMediumWriteStatus,
            "CurrentRecordQualityMode" => Variable::CurrentRecordQualityMode,
            "PossibleRecordQualityModes" => Variable::PossibleRecordQualityModes,
            "NumberOfTracks" => Variable::NumberOfTracks,
            "CurrentTrack" => Variable::CurrentTrack,
            "CurrentTrackDuration" => Variable::CurrentTrackDuration,
            "CurrentMediaDuration" => Variable::CurrentMediaDuration,
            "CurrentTrackMetaData" => Variable::CurrentTrackMetaData,
            "CurrentTrackURI" => Variable::CurrentTrackURI,
            "AVTransportURI" => Variable::AVTransportURI,
            "AVTransportURIMetaData" => Variable::AVTransportURIMetaData,
            "NextAVTransportURI" => Variable::NextAVTransportURI,
            "NextAVTransportURIMetaData" => Variable::NextAVTransportURIMetaData,
            "RelativeTimePosition" => Variable::RelativeTimePosition,
            "AbsoluteTimePosition" => Variable::AbsoluteTimePosition,
            "RelativeCounterPosition" => Variable::RelativeCounterPosition,
            "AbsoluteCounterPosition" => Variable::AbsoluteCounterPosition,
            "CurrentTransportActions" => Variable::CurrentTransportActions,
            "LastChange" => Variable::LastChange,
            "A_ARG_TYPE_SeekMode" => Variable::ArgTypeSeekMode,
            "A_ARG_TYPE_SeekTarget" => Variable::ArgTypeSeekTarget,
            "A_ARG_TYPE_InstanceID" => Variable::ArgTypeInstanceId,
            _ => return None,
        })
    }
}

/// Actions AVTransport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SetAVTransportURI,
    SetNextAVTransportURI,
    GetMediaInfo,
    GetTransportInfo,
    GetPositionInfo,
    GetDeviceCapabilities,
    GetTransportSettings,
    Stop,
    Play,
    Pause,
    Record,
    Seek,
    Next,
    Previous,
    SetPlayMode,
    SetRecordQualityMode,
    GetCurrentTransportActions,
    GetStateVariables,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::SetAVTransportURI => "SetAVTransportURI",
            Action::SetNextAVTransportURI => "SetNextAVTransportURI",
            Action::GetMediaInfo => "GetMediaInfo",
            Action::GetTransportInfo => "GetTransportInfo",
            Action::GetPositionInfo => "GetPositionInfo",
            Action::GetDeviceCapabilities => "GetDeviceCapabilities",
            Action::GetTransportSettings => "GetTransportSettings",
            Action::Stop => "Stop",
            Action::Play => "Play",
            Action::Pause => "Pause",
            Action::Record => "Record",
            Action::Seek => "Seek",
            Action::Next => "Next",
            Action::Previous => "Previous",
            Action::SetPlayMode => "SetPlayMode",
            Action::SetRecordQualityMode => "SetRecordQualityMode",
            Action::GetCurrentTransportActions => "GetCurrentTransportActions",
            Action::GetStateVariables => "GetStateVariables",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SetAVTransportURI" => Action::SetAVTransportURI,
            "SetNextAVTransportURI" => Action::SetNextAVTransportURI,
            "GetMediaInfo" => Action::GetMediaInfo,
            "GetTransportInfo" => Action::GetTransportInfo,
            "GetPositionInfo" => Action::GetPositionInfo,
            "GetDeviceCapabilities" => Action::GetDeviceCapabilities,
            "GetTransportSettings" => Action::GetTransportSettings,
            "Stop" => Action::Stop,
            "Play" => Action::Play,
            "Pause" => Action::Pause,
            "Record" => Action::Record,
            "Seek" => Action::Seek,
            "Next" => Action::Next,
            "Previous" => Action::Previous,
            "SetPlayMode" => Action::SetPlayMode,
            "SetRecordQualityMode" => Action::SetRecordQualityMode,
            "GetCurrentTransportActions" => Action::GetCurrentTransportActions,
            "GetStateVariables" => Action::GetStateVariables,
            _ => return None,
        })
    }
}

/// Modes de positionnement du Seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    TrackNr,
    AbsTime,
    RelTime,
    AbsCount,
    RelCount,
}

impl SeekMode {
    pub fn name(self) -> &'static str {
        match self {
            SeekMode::TrackNr => "TRACK_NR",
            SeekMode::AbsTime => "ABS_TIME",
            SeekMode::RelTime => "REL_TIME",
            SeekMode::AbsCount => "ABS_COUNT",
            SeekMode::RelCount => "REL_COUNT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "TRACK_NR" => SeekMode::TrackNr,
            "ABS_TIME" => SeekMode::AbsTime,
            "REL_TIME" => SeekMode::RelTime,
            "ABS_COUNT" => SeekMode::AbsCount,
            "REL_COUNT" => SeekMode::RelCount,
            _ => return None,
        })
    }
}

/// Modes de lecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Normal,
    Shuffle,
    RepeatOne,
    RepeatAll,
    Random,
    Direct1,
    Intro,
}

impl PlayMode {
    pub fn name(self) -> &'static str {
        match self {
            PlayMode::Normal => "NORMAL",
            PlayMode::Shuffle => "SHUFFLE",
            PlayMode::RepeatOne => "REPEAT_ONE",
            PlayMode::RepeatAll => "REPEAT_ALL",
            PlayMode::Random => "RANDOM",
            PlayMode::Direct1 => "DIRECT_1",
            PlayMode::Intro => "INTRO",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "NORMAL" => PlayMode::Normal,
            "SHUFFLE" => PlayMode::Shuffle,
            "REPEAT_ONE" => PlayMode::RepeatOne,
            "REPEAT_ALL" => PlayMode::RepeatAll,
            "RANDOM" => PlayMode::Random,
            "DIRECT_1" => PlayMode::Direct1,
            "INTRO" => PlayMode::Intro,
            _ => return None,
        })
    }
}

/// Callbacks métier du transport. Les actions optionnelles du profil ont
/// une implémentation par défaut qui répond 602.
pub trait AvTransportHandler: Send + Sync {
    fn set_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ServiceError>;

    fn set_next_av_transport_uri(
        &self,
        _instance_id: u32,
        _uri: &str,
        _metadata: &str,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented(
            "SetNextAVTransportURI".into(),
        ))
    }

    fn play(&self, instance_id: u32, speed: &str) -> Result<(), ServiceError>;

    fn pause(&self, _instance_id: u32) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Pause".into()))
    }

    fn stop(&self, instance_id: u32) -> Result<(), ServiceError>;

    fn record(&self, _instance_id: u32) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Record".into()))
    }

    fn seek(&self, _instance_id: u32, _mode: SeekMode, _target: &str) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Seek".into()))
    }

    fn next(&self, _instance_id: u32) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Next".into()))
    }

    fn previous(&self, _instance_id: u32) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Previous".into()))
    }

    fn set_play_mode(&self, _instance_id: u32, _mode: PlayMode) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("SetPlayMode".into()))
    }

    fn set_record_quality_mode(&self, _instance_id: u32, _mode: &str) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented(
            "SetRecordQualityMode".into(),
        ))
    }
}

/// Hôte AVTransport : variables, dispatch, LastChange.
pub struct AvTransportService {
    service_type: ServiceType,
    store: VariableStore<Variable>,
    handler: Arc<dyn AvTransportHandler>,
    last_change: LastChangeVariable,
    publisher: EventPublisher,
}

impl AvTransportService {
    pub fn new(
        publisher: EventPublisher,
        handler: Arc<dyn AvTransportHandler>,
        last_change_min_interval: Duration,
    ) -> Arc<Self> {
        let service_type = ServiceType::av_transport(1);
        let last_change = LastChangeVariable::new(service_type, last_change_min_interval);

        let service = Arc::new(Self {
            service_type,
            store: VariableStore::new(),
            handler,
            last_change,
            publisher: publisher.clone(),
        });

        let service_id = service_type.urn_id_string();
        service.last_change.on_event(move |event| {
            let body = build_single_property("LastChange", &event);
            publisher.notify(&service_id, &body);
        });

        service
    }

    /// Écrit une variable de l'instance par défaut.
    pub fn set_variable(&self, var: Variable, value: &str) {
        self.set_instance_variable(0, var, value);
    }

    /// Écrit une variable d'instance. Les positions et compteurs ne
    /// passent pas par LastChange ; tout le reste y est agrégé.
    pub fn set_instance_variable(&self, instance_id: u32, var: Variable, value: &str) {
        if self.store.value_of(instance_id, var) == value
            && self.store.get(instance_id, var).is_some()
        {
            return;
        }

        self.store.set(instance_id, var, value);

        if matches!(
            var,
            Variable::RelativeTimePosition
                | Variable::AbsoluteTimePosition
                | Variable::RelativeCounterPosition
                | Variable::AbsoluteCounterPosition
        ) {
            return;
        }

        debug!("AVTransport change: {} = {}", var.name(), value);
        self.last_change
            .add_changed_variable(instance_id, ServiceVariable::new(var.name(), value));
    }

    /// Variante avec attribut (le schéma LastChange en porte sur
    /// certaines variables).
    pub fn set_instance_variable_with_attribute(
        &self,
        instance_id: u32,
        var: Variable,
        value: &str,
        attr_name: &str,
        attr_value: &str,
    ) {
        self.store
            .set_with_attribute(instance_id, var, value, attr_name, attr_value);
        self.last_change.add_changed_variable(
            instance_id,
            ServiceVariable::new(var.name(), value).with_attribute(attr_name, attr_value),
        );
    }

    /// Émet immédiatement une variable non agrégée (positions, compteurs).
    pub fn notify_variable_change(&self, var: Variable, instance_id: u32) {
        if let Some(sv) = self.store.get(instance_id, var) {
            super::notify_single_variable(&self.publisher, self.service_type, &sv);
        }
    }

    /// Document `stateVariableValuePairs` pour GetStateVariables.
    ///
    /// `variable_list` vaut `*` ou une liste CSV de noms ; LastChange et
    /// les variables A_ARG_TYPE sont exclues.
    fn state_variables_document(
        &self,
        instance_id: u32,
        variable_list: &str,
    ) -> Result<String, ServiceError> {
        let pairs: Vec<(String, String)> = if variable_list.trim() == "*" {
            self.store.named_values(instance_id)
        } else {
            let mut out = Vec::new();
            for name in variable_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let var = Variable::from_name(name).ok_or_else(|| {
                    ServiceError::ArgumentValueInvalid(format!("unknown variable {}", name))
                })?;
                out.push((name.to_string(), self.store.value_of(instance_id, var)));
            }
            out
        };

        let mut root = Element::new("stateVariableValuePairs");
        for (name, value) in pairs {
            if name == "LastChange" || name.starts_with("A_ARG_TYPE_") {
                continue;
            }
            let mut var_elem = Element::new("stateVariable");
            var_elem
                .attributes
                .insert("variableName".to_string(), name);
            var_elem.children.push(XMLNode::Text(value));
            root.children.push(XMLNode::Element(var_elem));
        }

        let mut buf = Vec::new();
        let config = EmitterConfig::new().write_document_declaration(false);
        root.write_with_config(&mut buf, config)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl ServiceHost for AvTransportService {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn on_action(&self, request: &SoapAction) -> Result<ActionResponse, ServiceError> {
        let action = Action::from_name(&request.name)
            .ok_or_else(|| ServiceError::InvalidAction(request.name.clone()))?;
        let id = request.instance_id()?;

        let mut response = ActionResponse::new(request.name.clone(), self.service_type);

        match action {
            Action::SetAVTransportURI => {
                self.handler.set_av_transport_uri(
                    id,
                    request.required_arg("CurrentURI")?,
                    request.arg("CurrentURIMetaData").unwrap_or_default(),
                )?;
            }
            Action::SetNextAVTransportURI => {
                self.handler.set_next_av_transport_uri(
                    id,
                    request.required_arg("NextURI")?,
                    request.arg("NextURIMetaData").unwrap_or_default(),
                )?;
            }
            Action::GetMediaInfo => {
                let v = |var| self.store.value_of(id, var);
                response.add_argument("NrTracks", v(Variable::NumberOfTracks));
                response.add_argument("MediaDuration", v(Variable::CurrentMediaDuration));
                response.add_argument("CurrentURI", v(Variable::CurrentTrackURI));
                response.add_argument("CurrentURIMetaData", v(Variable::CurrentTrackMetaData));
                response.add_argument("NextURI", v(Variable::NextAVTransportURI));
                response.add_argument("NextURIMetaData", v(Variable::NextAVTransportURIMetaData));
                response.add_argument("PlayMedium", v(Variable::PlaybackStorageMedium));
                response.add_argument("RecordMedium", v(Variable::RecordStorageMedium));
                response.add_argument("WriteStatus", v(Variable::RecordMediumWriteStatus));
            }
            Action::GetTransportInfo => {
                let v = |var| self.store.value_of(id, var);
                response.add_argument("CurrentTransportState", v(Variable::TransportState));
                response.add_argument("CurrentTransportStatus", v(Variable::TransportStatus));
                response.add_argument("CurrentSpeed", v(Variable::TransportPlaySpeed));
            }
            Action::GetPositionInfo => {
                let v = |var| self.store.value_of(id, var);
                response.add_argument("Track", v(Variable::CurrentTrack));
                response.add_argument("TrackDuration", v(Variable::CurrentTrackDuration));
                response.add_argument("TrackMetaData", v(Variable::CurrentTrackMetaData));
                response.add_argument("TrackURI", v(Variable::CurrentTrackURI));
                response.add_argument("RelTime", v(Variable::RelativeTimePosition));
                response.add_argument("AbsTime", v(Variable::AbsoluteTimePosition));
                response.add_argument("RelCount", v(Variable::RelativeCounterPosition));
                response.add_argument("AbsCount", v(Variable::AbsoluteCounterPosition));
            }
            Action::GetDeviceCapabilities => {
                let v = |var| self.store.value_of(id, var);
                response.add_argument("PlayMedia", v(Variable::PossiblePlaybackStorageMedia));
                response.add_argument("RecMedia", v(Variable::PossibleRecordStorageMedia));
                response.add_argument("RecQualityModes", v(Variable::PossibleRecordQualityModes));
            }
            Action::GetTransportSettings => {
                let v = |var| self.store.value_of(id, var);
                response.add_argument("PlayMode", v(Variable::CurrentPlayMode));
                response.add_argument("RecQualityModes", v(Variable::CurrentRecordQualityMode));
            }
            Action::GetCurrentTransportActions => {
                response.add_argument(
                    "Actions",
                    self.store.value_of(id, Variable::CurrentTransportActions),
                );
            }
            Action::Stop => self.handler.stop(id)?,
            Action::Play => {
                self.handler.play(id, request.arg("Speed").unwrap_or("1"))?;
            }
            Action::Pause => self.handler.pause(id)?,
            Action::Record => self.handler.record(id)?,
            Action::Seek => {
                let unit = request.required_arg("Unit")?;
                let mode = SeekMode::from_name(unit).ok_or_else(|| {
                    ServiceError::upnp(710, "Seek mode is not supported")
                })?;
                self.handler.seek(id, mode, request.required_arg("Target")?)?;
            }
            Action::Next => self.handler.next(id)?,
            Action::Previous => self.handler.previous(id)?,
            Action::SetPlayMode => {
                let raw = request.required_arg("NewPlayMode")?;
                let mode = PlayMode::from_name(raw).ok_or_else(|| {
                    ServiceError::upnp(712, "Play mode is not supported")
                })?;
                self.handler.set_play_mode(id, mode)?;
            }
            Action::SetRecordQualityMode => {
                self.handler
                    .set_record_quality_mode(id, request.required_arg("NewRecordQualityMode")?)?;
            }
            Action::GetStateVariables => {
                let list = request.required_arg("StateVariableList")?;
                response.add_argument(
                    "StateVariableList",
                    self.state_variables_document(id, list)?,
                );
            }
        }

        Ok(response)
    }

    fn subscription_response(&self) -> String {
        let metadata_urn = self
            .service_type
            .urn_metadata_string()
            .expect("AVTransport has a metadata urn");
        let event = build_last_change_event(metadata_urn, &self.store.all());
        build_single_property("LastChange", &event)
    }

    fn scpd_document(&self) -> ScpdDocument {
        scpd()
    }
}

fn scpd() -> ScpdDocument {
    let instance = || arg_in("InstanceID", "A_ARG_TYPE_InstanceID");

    let actions = vec![
        ScpdAction {
            name: "SetAVTransportURI".into(),
            arguments: vec![
                instance(),
                arg_in("CurrentURI", "AVTransportURI"),
                arg_in("CurrentURIMetaData", "AVTransportURIMetaData"),
            ],
        },
        ScpdAction {
            name: "SetNextAVTransportURI".into(),
            arguments: vec![
                instance(),
                arg_in("NextURI", "NextAVTransportURI"),
                arg_in("NextURIMetaData", "NextAVTransportURIMetaData"),
            ],
        },
        ScpdAction {
            name: "GetMediaInfo".into(),
            arguments: vec![
                instance(),
                arg_out("NrTracks", "NumberOfTracks"),
                arg_out("MediaDuration", "CurrentMediaDuration"),
                arg_out("CurrentURI", "AVTransportURI"),
                arg_out("CurrentURIMetaData", "AVTransportURIMetaData"),
                arg_out("NextURI", "NextAVTransportURI"),
                arg_out("NextURIMetaData", "NextAVTransportURIMetaData"),
                arg_out("PlayMedium", "PlaybackStorageMedium"),
                arg_out("RecordMedium", "RecordStorageMedium"),
                arg_out("WriteStatus", "RecordMediumWriteStatus"),
            ],
        },
        ScpdAction {
            name: "GetTransportInfo".into(),
            arguments: vec![
                instance(),
                arg_out("CurrentTransportState", "TransportState"),
                arg_out("CurrentTransportStatus", "TransportStatus"),
                arg_out("CurrentSpeed", "TransportPlaySpeed"),
            ],
        },
        ScpdAction {
            name: "GetPositionInfo".into(),
            arguments: vec![
                instance(),
                arg_out("Track", "CurrentTrack"),
                arg_out("TrackDuration", "CurrentTrackDuration"),
                arg_out("TrackMetaData", "CurrentTrackMetaData"),
                arg_out("TrackURI", "CurrentTrackURI"),
                arg_out("RelTime", "RelativeTimePosition"),
                arg_out("AbsTime", "AbsoluteTimePosition"),
                arg_out("RelCount", "RelativeCounterPosition"),
                arg_out("AbsCount", "AbsoluteCounterPosition"),
            ],
        },
        ScpdAction {
            name: "GetDeviceCapabilities".into(),
            arguments: vec![
                instance(),
                arg_out("PlayMedia", "PossiblePlaybackStorageMedia"),
                arg_out("RecMedia", "PossibleRecordStorageMedia"),
                arg_out("RecQualityModes", "PossibleRecordQualityModes"),
            ],
        },
        ScpdAction {
            name: "GetTransportSettings".into(),
            arguments: vec![
                instance(),
                arg_out("PlayMode", "CurrentPlayMode"),
                arg_out("RecQualityModes", "CurrentRecordQualityMode"),
            ],
        },
        ScpdAction {
            name: "Stop".into(),
            arguments: vec![instance()],
        },
        ScpdAction {
            name: "Play".into(),
            arguments: vec![instance(), arg_in("Speed", "TransportPlaySpeed")],
        },
        ScpdAction {
            name: "Pause".into(),
            arguments: vec![instance()],
        },
        ScpdAction {
            name: "Record".into(),
            arguments: vec![instance()],
        },
        ScpdAction {
            name: "Seek".into(),
            arguments: vec![
                instance(),
                arg_in("Unit", "A_ARG_TYPE_SeekMode"),
                arg_in("Target", "A_ARG_TYPE_SeekTarget"),
            ],
        },
        ScpdAction {
            name: "Next".into(),
            arguments: vec![instance()],
        },
        ScpdAction {
            name: "Previous".into(),
            arguments: vec![instance()],
        },
        ScpdAction {
            name: "SetPlayMode".into(),
            arguments: vec![instance(), arg_in("NewPlayMode", "CurrentPlayMode")],
        },
        ScpdAction {
            name: "SetRecordQualityMode".into(),
            arguments: vec![
                instance(),
                arg_in("NewRecordQualityMode", "CurrentRecordQualityMode"),
            ],
        },
        ScpdAction {
            name: "GetCurrentTransportActions".into(),
            arguments: vec![instance(), arg_out("Actions", "CurrentTransportActions")],
        },
    ];

    let string_var = |name: &str, evented: bool| ScpdStateVariable {
        name: name.to_string(),
        data_type: "string".to_string(),
        send_events: evented,
        allowed_values: Vec::new(),
        default_value: None,
    };
    let ui4_var = |name: &str| ScpdStateVariable {
        name: name.to_string(),
        data_type: "ui4".to_string(),
        send_events: false,
        allowed_values: Vec::new(),
        default_value: None,
    };

    let state_variables = vec![
        ScpdStateVariable {
            name: "TransportState".into(),
            data_type: "string".into(),
            send_events: false,
            allowed_values: vec![
                "STOPPED".into(),
                "PLAYING".into(),
                "TRANSITIONING".into(),
                "PAUSED_PLAYBACK".into(),
                "PAUSED_RECORDING".into(),
                "RECORDING".into(),
                "NO_MEDIA_PRESENT".into(),
            ],
            default_value: None,
        },
        string_var("TransportStatus", false),
        string_var("PlaybackStorageMedium", false),
        string_var("RecordStorageMedium", false),
        string_var("PossiblePlaybackStorageMedia", false),
        string_var("PossibleRecordStorageMedia", false),
        string_var("CurrentPlayMode", false),
        string_var("TransportPlaySpeed", false),
        string_var("RecordMediumWriteStatus", false),
        string_var("CurrentRecordQualityMode", false),
        string_var("PossibleRecordQualityModes", false),
        ui4_var("NumberOfTracks"),
        ui4_var("CurrentTrack"),
        string_var("CurrentTrackDuration", false),
        string_var("CurrentMediaDuration", false),
        string_var("CurrentTrackMetaData", false),
        string_var("CurrentTrackURI", false),
        string_var("AVTransportURI", false),
        string_var("AVTransportURIMetaData", false),
        string_var("NextAVTransportURI", false),
        string_var("NextAVTransportURIMetaData", false),
        string_var("RelativeTimePosition", false),
        string_var("AbsoluteTimePosition", false),
        ScpdStateVariable {
            name: "RelativeCounterPosition".into(),
            data_type: "i4".into(),
            send_events: false,
            allowed_values: Vec::new(),
            default_value: None,
        },
        ScpdStateVariable {
            name: "AbsoluteCounterPosition".into(),
            data_type: "i4".into(),
            send_events: false,
            allowed_values: Vec::new(),
            default_value: None,
        },
        string_var("CurrentTransportActions", false),
        string_var("LastChange", true),
        string_var("A_ARG_TYPE_SeekMode", false),
        string_var("A_ARG_TYPE_SeekTarget", false),
        ui4_var("A_ARG_TYPE_InstanceID"),
    ];

    ScpdDocument {
        actions,
        state_variables,
    }
}
