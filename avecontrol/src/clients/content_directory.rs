//! Client ContentDirectory (navigation d'un MediaServer).

use aveupnp::services::contentdirectory::{Action, BrowseFlag, Variable};
use aveupnp::services::VariableKind;
use aveupnp::types::ServiceType;

use crate::description::Device;
use crate::errors::ControlError;
use crate::service_client::{ServiceClient, ServiceTraits, VariableEvent};
use crate::soap_client::{required_response_text, response_text};
use crate::subscriptions::EventRuntime;

pub struct ContentDirectoryTraits;

impl ServiceTraits for ContentDirectoryTraits {
    type Action = Action;
    type Variable = Variable;

    fn service_type() -> ServiceType {
        ServiceType::content_directory(1)
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
        content_directory_upnp_result(code, description)
    }
}

/// Table des codes ContentDirectory.
pub fn content_directory_upnp_result(code: u32, description: &str) -> ControlError {
    let message = match code {
        701 => "No such object",
        702 => "Invalid CurrentTagValue",
        703 => "Invalid NewTagValue",
        704 => "Required tag missing",
        705 => "Read-only tag",
        706 => "Parameter mismatch",
        708 => "Unsupported or invalid search criteria",
        709 => "Unsupported or invalid sort criteria",
        710 => "No such container",
        711 => "Restricted object",
        712 => "Bad metadata",
        713 => "Restricted parent object",
        714 => "No such source resource",
        715 => "Source resource access denied",
        716 => "Transfer busy",
        717 => "No such file transfer",
        718 => "No such destination resource",
        719 => "Destination resource access denied",
        720 => "Cannot process the request",
        _ => return crate::service_client::generic_upnp_result(code, description),
    };
    ControlError::Upnp(code, message.to_string())
}

/// Résultat d'un Browse ou d'un Search.
#[derive(Debug, Clone, Default)]
pub struct BrowseResponse {
    /// Document DIDL-Lite brut.
    pub didl: String,
    pub number_returned: u32,
    pub total_matches: u32,
    pub update_id: u32,
}

/// Client du service ContentDirectory.
pub struct ContentDirectoryClient {
    client: ServiceClient<ContentDirectoryTraits>,
}

impl ContentDirectoryClient {
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

    /// S'abonne aux mises à jour du contenu (SystemUpdateID,
    /// ContainerUpdateIDs).
    pub fn subscribe_updates(
        &self,
        on_update: impl Fn(Variable, String) + Send + 'static,
    ) -> Result<(), ControlError> {
        self.client.subscribe(move |event: VariableEvent<Variable>| {
            for (var, value) in event.values {
                on_update(var, value);
            }
        })
    }

    pub fn unsubscribe(&self) {
        self.client.unsubscribe();
    }

    pub fn browse(
        &self,
        object_id: &str,
        flag: BrowseFlag,
        filter: &str,
        starting_index: u32,
        requested_count: u32,
        sort_criteria: &str,
    ) -> Result<BrowseResponse, ControlError> {
        let start = starting_index.to_string();
        let count = requested_count.to_string();
        let response = self.client.execute(
            Action::Browse,
            &[
                ("ObjectID", object_id),
                ("BrowseFlag", flag.name()),
                ("Filter", filter),
                ("StartingIndex", start.as_str()),
                ("RequestedCount", count.as_str()),
                ("SortCriteria", sort_criteria),
            ],
        )?;

        browse_response(&response)
    }

    pub fn search(
        &self,
        container_id: &str,
        criteria: &str,
        filter: &str,
        starting_index: u32,
        requested_count: u32,
        sort_criteria: &str,
    ) -> Result<BrowseResponse, ControlError> {
        let start = starting_index.to_string();
        let count = requested_count.to_string();
        let response = self.client.execute(
            Action::Search,
            &[
                ("ContainerID", container_id),
                ("SearchCriteria", criteria),
                ("Filter", filter),
                ("StartingIndex", start.as_str()),
                ("RequestedCount", count.as_str()),
                ("SortCriteria", sort_criteria),
            ],
        )?;

        browse_response(&response)
    }

    pub fn get_system_update_id(&self) -> Result<u32, ControlError> {
        let response = self.client.execute(Action::GetSystemUpdateID, &[])?;
        let raw = required_response_text(&response, "Id")?;
        raw.parse::<u32>()
            .map_err(|_| ControlError::invalid_response(format!("SystemUpdateID: {}", raw)))
    }

    pub fn get_search_capabilities(&self) -> Result<Vec<String>, ControlError> {
        let response = self.client.execute(Action::GetSearchCapabilities, &[])?;
        Ok(split_csv(&response_text(&response, "SearchCaps")))
    }

    pub fn get_sort_capabilities(&self) -> Result<Vec<String>, ControlError> {
        let response = self.client.execute(Action::GetSortCapabilities, &[])?;
        Ok(split_csv(&response_text(&response, "SortCaps")))
    }
}

fn browse_response(response: &xmltree::Element) -> Result<BrowseResponse, ControlError> {
    Ok(BrowseResponse {
        didl: required_response_text(response, "Result")?,
        number_returned: response_text(response, "NumberReturned").parse().unwrap_or(0),
        total_matches: response_text(response, "TotalMatches").parse().unwrap_or(0),
        update_id: response_text(response, "UpdateID").parse().unwrap_or(0),
    })
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
    fn cd_fault_table() {
        assert!(matches!(
            content_directory_upnp_result(701, ""),
            ControlError::Upnp(701, msg) if msg == "No such object"
        ));
        assert!(matches!(
            content_directory_upnp_result(708, ""),
            ControlError::Upnp(708, msg) if msg == "Unsupported or invalid search criteria"
        ));
    }
}
