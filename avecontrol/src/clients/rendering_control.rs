//! Client RenderingControl (volume, mute).

use aveupnp::services::renderingcontrol::{Action, Variable, MASTER_CHANNEL};
use aveupnp::services::VariableKind;
use aveupnp::types::ServiceType;

use crate::description::Device;
use crate::errors::ControlError;
use crate::service_client::{ServiceClient, ServiceTraits, VariableEvent};
use crate::soap_client::required_response_text;
use crate::subscriptions::EventRuntime;

pub struct RenderingControlTraits;

impl ServiceTraits for RenderingControlTraits {
    type Action = Action;
    type Variable = Variable;

    fn service_type() -> ServiceType {
        ServiceType::rendering_control(1)
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
        rendering_control_upnp_result(code, description)
    }
}

/// Table des codes RenderingControl.
pub fn rendering_control_upnp_result(code: u32, description: &str) -> ControlError {
    let message = match code {
        701 => "Invalid preset name",
        702 => "Invalid instance id",
        _ => return crate::service_client::generic_upnp_result(code, description),
    };
    ControlError::Upnp(code, message.to_string())
}

/// Client du service RenderingControl d'un renderer.
pub struct RenderingControlClient {
    client: ServiceClient<RenderingControlTraits>,
}

impl RenderingControlClient {
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

    /// Abonnement aux lots LastChange (Volume/Mute décodés par instance).
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

    pub fn get_volume(&self, instance_id: u32) -> Result<u16, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetVolume,
            &[
                ("InstanceID", instance.as_str()),
                ("Channel", MASTER_CHANNEL),
            ],
        )?;

        let raw = required_response_text(&response, "CurrentVolume")?;
        raw.parse::<u16>()
            .map_err(|_| ControlError::invalid_response(format!("CurrentVolume: {}", raw)))
    }

    pub fn set_volume(&self, instance_id: u32, volume: u16) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        let volume = volume.to_string();
        self.client.execute(
            Action::SetVolume,
            &[
                ("InstanceID", instance.as_str()),
                ("Channel", MASTER_CHANNEL),
                ("DesiredVolume", volume.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn get_mute(&self, instance_id: u32) -> Result<bool, ControlError> {
        let instance = instance_id.to_string();
        let response = self.client.execute(
            Action::GetMute,
            &[
                ("InstanceID", instance.as_str()),
                ("Channel", MASTER_CHANNEL),
            ],
        )?;

        let raw = required_response_text(&response, "CurrentMute")?;
        Ok(matches!(raw.trim(), "1" | "true" | "yes"))
    }

    pub fn set_mute(&self, instance_id: u32, mute: bool) -> Result<(), ControlError> {
        let instance = instance_id.to_string();
        self.client.execute(
            Action::SetMute,
            &[
                ("InstanceID", instance.as_str()),
                ("Channel", MASTER_CHANNEL),
                ("DesiredMute", if mute { "1" } else { "0" }),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_fault_table() {
        assert!(matches!(
            rendering_control_upnp_result(702, ""),
            ControlError::Upnp(702, msg) if msg == "Invalid instance id"
        ));
        assert!(matches!(
            rendering_control_upnp_result(402, ""),
            ControlError::Upnp(402, msg) if msg == "Invalid arguments"
        ));
    }
}
