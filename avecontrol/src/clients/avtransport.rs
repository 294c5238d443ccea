//! Client AVTransport.

use std::time::Duration;

use aveupnp::services::avtransport::{Action, SeekMode, Variable, SUBSCRIPTION_TIMEOUT};
use aveupnp::services::VariableKind;
use aveupnp::types::ServiceType;
use tracing::warn;

use crate::description::Device;
use crate::errors::ControlError;
use crate::service_client::{ServiceClient, ServiceTraits, VariableEvent};
use crate::soap_client::response_text;
use crate::subscriptions::EventRuntime;

pub struct AvTransportTraits;

impl ServiceTraits for AvTransportTraits {
    type Action = Action;
    type Variable = Variable;

    fn service_type() -> ServiceType {
        ServiceType::av_transport(1)
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

    fn subscription_timeout() -> Duration {
        SUBSCRIPTION_TIMEOUT
    }

    fn handle_upnp_result(code: u32, description: &str) -> ControlError {
        avtransport_upnp_result(code, description)
    }
}

/// Table des codes AVTransport (700–799).
pub fn avtransport_upnp_result(code: u32, description: &str) -> ControlError {
    let message = match code {
        701 => "Playback transition not supported at this moment",
        702 => "No content found in media item",
        703 => "The media could not be read",
        704 => "Storage format not supported by the device",
        705 => "The device is locked",
        706 => "Error when writing media",
        707 => "Media is not writable",
        708 => "Format is not supported for recording",
        709 => "The media is full",
        710 => "Seek mode is not supported",
        711 => "Illegal seek target",
        712 => "Play mode is not supported",
        713 => "Record quality is not supported",
        714 => "Unsupported MIME-type",
        715 => "Resource is already being played",
        716 => "Resource not found",
        717 => "Play speed not supported",
        718 => "Invalid instance id",
        _ => return crate::service_client::generic_upnp_result(code, description),
    };
    ControlError::Upnp(code, message.to_string())
}

/// Position de lecture (GetPositionInfo).
#[derive(Debug, Clone, Default)]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration: String,
    pub track_metadata: String,
    pub track_uri: String,
    pub relative_time: String,
    pub absolute_time: String,
    pub relative_count: i32,
    pub absolute_count: i32,
}

/// Média courant (GetMediaInfo).
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub number_of_tracks: u32,
    pub media_duration: String,
    pub current_uri: String,
    pub current_uri_metadata: String,
    pub next_uri: String,
    pub next_uri_metadata: String,
    pub play_medium: String,
    pub record_medium: String,
    pub write_status: String,
}

/// État du transport (GetTransportInfo).
#[derive(Debug, Clone, Default)]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
    pub current_speed: String,
}

/// Client du service AVTransport d'un renderer.
pub struct AvTransportClient {
    client: ServiceClient<AvTransportTraits>,
}

impl AvTransportClient {
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

    pub fn supports_action(&self, action: Action) -> bool {
        self.client.supports_action(action)
    }

    /// S'abonne et ne remonte que les lots LastChange, décodés par
    /// instance.
    pub fn subscribe_last_change(
        &self,
        on_change: impl Fn(u32, Vec<(Variable, String)>) + Send + 'static,
    ) -> Result<(), ControlError> {
        self.client.subscribe(move |event: VariableEvent<Variable>| {
            if event.changed == Variable::LastChange {
                on_change(event.instance_id, event.values);
            }
        })
    }

    pub fn unsubscribe(&self) {
        self.client.unsubscribe();
    }

    pub fn set_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client.execute(
            Action::SetAVTransportURI,
            &[
                ("InstanceID", instance.as_str()),
                ("CurrentURI", uri),
                ("CurrentURIMetaData", metadata),
            ],
        )?;
        Ok(())
    }

    pub fn set_next_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client.execute(
            Action::SetNextAVTransportURI,
            &[
                ("InstanceID", instance.as_str()),
                ("NextURI", uri),
                ("NextURIMetaData", metadata),
            ],
        )?;
        Ok(())
    }

    pub fn play(&self, instance_id: u32, speed: &str) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client.execute(
            Action::Play,
            &[("InstanceID", instance.as_str()), ("Speed", speed)],
        )?;
        Ok(())
    }

    pub fn pause(&self, instance_id: u32) -> Result<(), ControlError> {
        self.simple_action(Action::Pause, instance_id)
    }

    pub fn stop(&self, instance_id: u32) -> Result<(), ControlError> {
        self.simple_action(Action::Stop, instance_id)
    }

    pub fn next(&self, instance_id: u32) -> Result<(), ControlError> {
        self.simple_action(Action::Next, instance_id)
    }

    pub fn previous(&self, instance_id: u32) -> Result<(), ControlError> {
        self.simple_action(Action::Previous, instance_id)
    }

    pub fn seek(
        &self,
        instance_id: u32,
        mode: SeekMode,
        target: &str,
    ) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client.execute(
            Action::Seek,
            &[
                ("InstanceID", instance.as_str()),
                ("Unit", mode.name()),
                ("Target", target),
            ],
        )?;
        Ok(())
    }

    pub fn get_transport_info(&self, instance_id: u32) -> Result<TransportInfo, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetTransportInfo,
            &[("InstanceID", instance.as_str())],
        )?;

        Ok(TransportInfo {
            current_transport_state: response_text(&response, "CurrentTransportState"),
            current_transport_status: response_text(&response, "CurrentTransportStatus"),
            current_speed: response_text(&response, "CurrentSpeed"),
        })
    }

    pub fn get_position_info(&self, instance_id: u32) -> Result<PositionInfo, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetPositionInfo,
            &[("InstanceID", instance.as_str())],
        )?;

        Ok(PositionInfo {
            track: response_text(&response, "Track").parse().unwrap_or(0),
            track_duration: response_text(&response, "TrackDuration"),
            track_metadata: response_text(&response, "TrackMetaData"),
            track_uri: response_text(&response, "TrackURI"),
            relative_time: response_text(&response, "RelTime"),
            absolute_time: response_text(&response, "AbsTime"),
            relative_count: response_text(&response, "RelCount").parse().unwrap_or(0),
            absolute_count: response_text(&response, "AbsCount").parse().unwrap_or(0),
        })
    }

    pub fn get_media_info(&self, instance_id: u32) -> Result<MediaInfo, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetMediaInfo,
            &[("InstanceID", instance.as_str())],
        )?;

        Ok(MediaInfo {
            number_of_tracks: response_text(&response, "NrTracks").parse().unwrap_or(0),
            media_duration: response_text(&response, "MediaDuration"),
            current_uri: response_text(&response, "CurrentURI"),
            current_uri_metadata: response_text(&response, "CurrentURIMetaData"),
            next_uri: response_text(&response, "NextURI"),
            next_uri_metadata: response_text(&response, "NextURIMetaData"),
            play_medium: response_text(&response, "PlayMedium"),
            record_medium: response_text(&response, "RecordMedium"),
            write_status: response_text(&response, "WriteStatus"),
        })
    }

    /// Actions de transport actuellement permises (CSV décodé ; les noms
    /// inconnus sont ignorés avec un log).
    pub fn get_current_transport_actions(
        &self,
        instance_id: u32,
    ) -> Result<Vec<Action>, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetCurrentTransportActions,
            &[("InstanceID", instance.as_str())],
        )?;

        let mut actions = Vec::new();
        for name in response_text(&response, "Actions")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            match Action::from_name(name) {
                Some(action) => actions.push(action),
                None => warn!("Unknown transport action {} ignored", name),
            }
        }
        Ok(actions)
    }

    fn simple_action(&self, action: Action, instance_id: u32) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client
            .execute(action, &[("InstanceID", instance.as_str())])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_table_spells_out_701() {
        match avtransport_upnp_result(701, "") {
            ControlError::Upnp(701, message) => {
                assert_eq!(message, "Playback transition not supported at this moment");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unknown_code_falls_through_to_generic() {
        assert!(matches!(
            avtransport_upnp_result(401, ""),
            ControlError::Upnp(401, _)
        ));
        assert!(matches!(
            avtransport_upnp_result(750, "vendor"),
            ControlError::Upnp(750, msg) if msg == "vendor"
        ));
    }

    #[test]
    fn subscription_timeout_is_1801() {
        assert_eq!(
            <AvTransportTraits as ServiceTraits>::subscription_timeout(),
            Duration::from_secs(1801)
        );
    }
}
