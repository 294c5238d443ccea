//! Service RenderingControl hébergé (volume, mute, presets).
//!
//! Même architecture que l'hôte AVTransport : variables par instance,
//! LastChange agrégé, logique déléguée au handler. Les variables Volume et
//! Mute portent l'attribut `channel` dans les événements.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::ServiceError;
use crate::gena::propertyset::build_single_property;
use crate::gena::EventPublisher;
use crate::lastchange::{build_last_change_event, LastChangeVariable};
use crate::scpd::{arg_in, arg_out, ScpdAction, ScpdDocument, ScpdStateVariable};
use crate::soap::SoapAction;
use crate::types::{ServiceType, ServiceVariable};

use super::{ActionResponse, ServiceHost, VariableKind, VariableStore};

/// Canal audio par défaut.
pub const MASTER_CHANNEL: &str = "Master";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    PresetNameList,
    Mute,
    Volume,
    LastChange,
    ArgTypeChannel,
    ArgTypeInstanceId,
    ArgTypePresetName,
}

impl VariableKind for Variable {
    fn name(self) -> &'static str {
        match self {
            Variable::PresetNameList => "PresetNameList",
            Variable::Mute => "Mute",
            Variable::Volume => "Volume",
            Variable::LastChange => "LastChange",
            Variable::ArgTypeChannel => "A_ARG_TYPE_Channel",
            Variable::ArgTypeInstanceId => "A_ARG_TYPE_InstanceID",
            Variable::ArgTypePresetName => "A_ARG_TYPE_PresetName",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "PresetNameList" => Variable::PresetNameList,
            "Mute" => Variable::Mute,
            "Volume" => Variable::Volume,
            "LastChange" => Variable::LastChange,
            "A_ARG_TYPE_Channel" => Variable::ArgTypeChannel,
            "A_ARG_TYPE_InstanceID" => Variable::ArgTypeInstanceId,
            "A_ARG_TYPE_PresetName" => Variable::ArgTypePresetName,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ListPresets,
    SelectPreset,
    GetMute,
    SetMute,
    GetVolume,
    SetVolume,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::ListPresets => "ListPresets",
            Action::SelectPreset => "SelectPreset",
            Action::GetMute => "GetMute",
            Action::SetMute => "SetMute",
            Action::GetVolume => "GetVolume",
            Action::SetVolume => "SetVolume",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ListPresets" => Action::ListPresets,
            "SelectPreset" => Action::SelectPreset,
            "GetMute" => Action::GetMute,
            "SetMute" => Action::SetMute,
            "GetVolume" => Action::GetVolume,
            "SetVolume" => Action::SetVolume,
            _ => return None,
        })
    }
}

/// Callbacks métier du contrôle de rendu.
pub trait RenderingControlHandler: Send + Sync {
    fn set_volume(&self, instance_id: u32, channel: &str, volume: u16) -> Result<(), ServiceError>;

    fn set_mute(&self, instance_id: u32, channel: &str, mute: bool) -> Result<(), ServiceError>;

    fn select_preset(&self, _instance_id: u32, _preset: &str) -> Result<(), ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("SelectPreset".into()))
    }
}

pub struct RenderingControlService {
    service_type: ServiceType,
    store: VariableStore<Variable>,
    handler: Arc<dyn RenderingControlHandler>,
    last_change: LastChangeVariable,
    publisher: EventPublisher,
}

impl RenderingControlService {
    pub fn new(
        publisher: EventPublisher,
        handler: Arc<dyn RenderingControlHandler>,
        last_change_min_interval: Duration,
    ) -> Arc<Self> {
        let service_type = ServiceType::rendering_control(1);
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

        // Valeurs de départ raisonnables, écrasées par l'embarqueur.
        service.store.set(0, Variable::PresetNameList, "FactoryDefaults");
        service.set_volume_variable(0, MASTER_CHANNEL, 100);
        service.set_mute_variable(0, MASTER_CHANNEL, false);

        service
    }

    /// Reflète un volume dans l'état et l'événementiel (à appeler aussi
    /// quand le volume change hors UPnP, par la télécommande physique).
    pub fn set_volume_variable(&self, instance_id: u32, channel: &str, volume: u16) {
        let value = volume.to_string();
        self.store
            .set_with_attribute(instance_id, Variable::Volume, &value, "channel", channel);
        self.last_change.add_changed_variable(
            instance_id,
            ServiceVariable::new("Volume", value).with_attribute("channel", channel),
        );
    }

    /// Reflète un état mute dans l'état et l'événementiel.
    pub fn set_mute_variable(&self, instance_id: u32, channel: &str, mute: bool) {
        let value = if mute { "1" } else { "0" };
        self.store
            .set_with_attribute(instance_id, Variable::Mute, value, "channel", channel);
        self.last_change.add_changed_variable(
            instance_id,
            ServiceVariable::new("Mute", value).with_attribute("channel", channel),
        );
    }

    fn channel_of(request: &SoapAction) -> String {
        request.arg("Channel").unwrap_or(MASTER_CHANNEL).to_string()
    }
}

impl ServiceHost for RenderingControlService {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn on_action(&self, request: &SoapAction) -> Result<ActionResponse, ServiceError> {
        let action = Action::from_name(&request.name)
            .ok_or_else(|| ServiceError::InvalidAction(request.name.clone()))?;
        let id = request.instance_id()?;
        let channel = Self::channel_of(request);

        let mut response = ActionResponse::new(request.name.clone(), self.service_type);

        match action {
            Action::ListPresets => {
                response.add_argument(
                    "CurrentPresetNameList",
                    self.store.value_of(id, Variable::PresetNameList),
                );
            }
            Action::SelectPreset => {
                self.handler
                    .select_preset(id, request.required_arg("PresetName")?)?;
            }
            Action::GetMute => {
                response
                    .add_argument("CurrentMute", self.store.value_of(id, Variable::Mute));
            }
            Action::SetMute => {
                let desired = parse_boolean(request.required_arg("DesiredMute")?)?;
                self.handler.set_mute(id, &channel, desired)?;
                self.set_mute_variable(id, &channel, desired);
            }
            Action::GetVolume => {
                response
                    .add_argument("CurrentVolume", self.store.value_of(id, Variable::Volume));
            }
            Action::SetVolume => {
                let raw = request.required_arg("DesiredVolume")?;
                let desired = raw.trim().parse::<u16>().map_err(|_| {
                    ServiceError::ArgumentValueInvalid(format!("DesiredVolume: {}", raw))
                })?;
                if desired > 100 {
                    return Err(ServiceError::ArgumentValueOutOfRange(format!(
                        "DesiredVolume: {}",
                        desired
                    )));
                }
                self.handler.set_volume(id, &channel, desired)?;
                self.set_volume_variable(id, &channel, desired);
            }
        }

        Ok(response)
    }

    fn subscription_response(&self) -> String {
        let metadata_urn = self
            .service_type
            .urn_metadata_string()
            .expect("RenderingControl has a metadata urn");
        let event = build_last_change_event(metadata_urn, &self.store.all());
        build_single_property("LastChange", &event)
    }

    fn scpd_document(&self) -> ScpdDocument {
        let instance = || arg_in("InstanceID", "A_ARG_TYPE_InstanceID");
        let channel = || arg_in("Channel", "A_ARG_TYPE_Channel");

        ScpdDocument {
            actions: vec![
                ScpdAction {
                    name: "ListPresets".into(),
                    arguments: vec![instance(), arg_out("CurrentPresetNameList", "PresetNameList")],
                },
                ScpdAction {
                    name: "SelectPreset".into(),
                    arguments: vec![instance(), arg_in("PresetName", "A_ARG_TYPE_PresetName")],
                },
                ScpdAction {
                    name: "GetMute".into(),
                    arguments: vec![instance(), channel(), arg_out("CurrentMute", "Mute")],
                },
                ScpdAction {
                    name: "SetMute".into(),
                    arguments: vec![instance(), channel(), arg_in("DesiredMute", "Mute")],
                },
                ScpdAction {
                    name: "GetVolume".into(),
                    arguments: vec![instance(), channel(), arg_out("CurrentVolume", "Volume")],
                },
                ScpdAction {
                    name: "SetVolume".into(),
                    arguments: vec![instance(), channel(), arg_in("DesiredVolume", "Volume")],
                },
            ],
            state_variables: vec![
                ScpdStateVariable {
                    name: "PresetNameList".into(),
                    data_type: "string".into(),
                    send_events: false,
                    allowed_values: Vec::new(),
                    default_value: None,
                },
                ScpdStateVariable {
                    name: "Mute".into(),
                    data_type: "boolean".into(),
                    send_events: false,
                    allowed_values: Vec::new(),
                    default_value: Some("0".into()),
                },
                ScpdStateVariable {
                    name: "Volume".into(),
                    data_type: "ui2".into(),
                    send_events: false,
                    allowed_values: Vec::new(),
                    default_value: Some("100".into()),
                },
                ScpdStateVariable {
                    name: "LastChange".into(),
                    data_type: "string".into(),
                    send_events: true,
                    allowed_values: Vec::new(),
                    default_value: None,
                },
                ScpdStateVariable {
                    name: "A_ARG_TYPE_Channel".into(),
                    data_type: "string".into(),
                    send_events: false,
                    allowed_values: vec!["Master".into()],
                    default_value: None,
                },
                ScpdStateVariable {
                    name: "A_ARG_TYPE_InstanceID".into(),
                    data_type: "ui4".into(),
                    send_events: false,
                    allowed_values: Vec::new(),
                    default_value: None,
                },
                ScpdStateVariable {
                    name: "A_ARG_TYPE_PresetName".into(),
                    data_type: "string".into(),
                    send_events: false,
                    allowed_values: vec!["FactoryDefaults".into()],
                    default_value: None,
                },
            ],
        }
    }
}

fn parse_boolean(raw: &str) -> Result<bool, ServiceError> {
    match raw.trim() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ServiceError::ArgumentValueInvalid(format!(
            "boolean: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_action;

    struct NullHandler;

    impl RenderingControlHandler for NullHandler {
        fn set_volume(&self, _: u32, _: &str, _: u16) -> Result<(), ServiceError> {
            Ok(())
        }

        fn set_mute(&self, _: u32, _: &str, _: bool) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn service() -> Arc<RenderingControlService> {
        RenderingControlService::new(
            EventPublisher::new(),
            Arc::new(NullHandler),
            Duration::from_millis(200),
        )
    }

    fn soap(action: &str, args: &str) -> SoapAction {
        let xml = format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:{0} xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">{1}</u:{0}>
  </s:Body>
</s:Envelope>"#,
            action, args
        );
        parse_soap_action(xml.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn set_then_get_volume() {
        let service = service();
        let set = soap(
            "SetVolume",
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>40</DesiredVolume>",
        );
        service.on_action(&set).unwrap();

        let get = soap("GetVolume", "<InstanceID>0</InstanceID><Channel>Master</Channel>");
        let response = service.on_action(&get).unwrap();
        assert_eq!(
            response.arguments(),
            &[("CurrentVolume".to_string(), "40".to_string())]
        );
    }

    #[tokio::test]
    async fn volume_out_of_range_is_601() {
        let service = service();
        let set = soap(
            "SetVolume",
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>140</DesiredVolume>",
        );
        let err = service.on_action(&set).unwrap_err();
        assert_eq!(err.error_code(), 601);
    }

    #[tokio::test]
    async fn mute_round_trip() {
        let service = service();
        let set = soap(
            "SetMute",
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredMute>1</DesiredMute>",
        );
        service.on_action(&set).unwrap();

        let get = soap("GetMute", "<InstanceID>0</InstanceID><Channel>Master</Channel>");
        let response = service.on_action(&get).unwrap();
        assert_eq!(
            response.arguments(),
            &[("CurrentMute".to_string(), "1".to_string())]
        );
    }

    #[tokio::test]
    async fn subscription_response_has_channel_attribute() {
        let service = service();
        let body = service.subscription_response();
        assert!(body.contains("LastChange"));
        assert!(body.contains(r#"channel="Master""#));
    }
}
