//! Service ContentDirectory hébergé (côté MediaServer).
//!
//! Le moteur ne connaît rien au contenu : Browse et Search sont délégués au
//! handler qui rend du DIDL-Lite déjà sérialisé. SystemUpdateID et
//! ContainerUpdateIDs sont événementés directement, sans LastChange.

use std::sync::Arc;

use crate::errors::ServiceError;
use crate::gena::propertyset::build_property_set;
use crate::gena::EventPublisher;
use crate::scpd::{arg_in, arg_out, ScpdAction, ScpdDocument, ScpdStateVariable};
use crate::soap::SoapAction;
use crate::types::ServiceType;

use super::{ActionResponse, ServiceHost, VariableKind, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    SystemUpdateID,
    ContainerUpdateIDs,
    SearchCapabilities,
    SortCapabilities,
    ArgTypeObjectId,
    ArgTypeResult,
    ArgTypeBrowseFlag,
    ArgTypeFilter,
    ArgTypeSortCriteria,
    ArgTypeSearchCriteria,
    ArgTypeIndex,
    ArgTypeCount,
    ArgTypeUpdateId,
}

impl VariableKind for Variable {
    fn name(self) -> &'static str {
        match self {
            Variable::SystemUpdateID => "SystemUpdateID",
            Variable::ContainerUpdateIDs => "ContainerUpdateIDs",
            Variable::SearchCapabilities => "SearchCapabilities",
            Variable::SortCapabilities => "SortCapabilities",
            Variable::ArgTypeObjectId => "A_ARG_TYPE_ObjectID",
            Variable::ArgTypeResult => "A_ARG_TYPE_Result",
            Variable::ArgTypeBrowseFlag => "A_ARG_TYPE_BrowseFlag",
            Variable::ArgTypeFilter => "A_ARG_TYPE_Filter",
            Variable::ArgTypeSortCriteria => "A_ARG_TYPE_SortCriteria",
            Variable::ArgTypeSearchCriteria => "A_ARG_TYPE_SearchCriteria",
            Variable::ArgTypeIndex => "A_ARG_TYPE_Index",
            Variable::ArgTypeCount => "A_ARG_TYPE_Count",
            Variable::ArgTypeUpdateId => "A_ARG_TYPE_UpdateID",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SystemUpdateID" => Variable::SystemUpdateID,
            "ContainerUpdateIDs" => Variable::ContainerUpdateIDs,
            "SearchCapabilities" => Variable::SearchCapabilities,
            "SortCapabilities" => Variable::SortCapabilities,
            "A_ARG_TYPE_ObjectID" => Variable::ArgTypeObjectId,
            "A_ARG_TYPE_Result" => Variable::ArgTypeResult,
            "A_ARG_TYPE_BrowseFlag" => Variable::ArgTypeBrowseFlag,
            "A_ARG_TYPE_Filter" => Variable::ArgTypeFilter,
            "A_ARG_TYPE_SortCriteria" => Variable::ArgTypeSortCriteria,
            "A_ARG_TYPE_SearchCriteria" => Variable::ArgTypeSearchCriteria,
            "A_ARG_TYPE_Index" => Variable::ArgTypeIndex,
            "A_ARG_TYPE_Count" => Variable::ArgTypeCount,
            "A_ARG_TYPE_UpdateID" => Variable::ArgTypeUpdateId,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetSearchCapabilities,
    GetSortCapabilities,
    GetSystemUpdateID,
    Browse,
    Search,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::GetSearchCapabilities => "GetSearchCapabilities",
            Action::GetSortCapabilities => "GetSortCapabilities",
            Action::GetSystemUpdateID => "GetSystemUpdateID",
            Action::Browse => "Browse",
            Action::Search => "Search",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "GetSearchCapabilities" => Action::GetSearchCapabilities,
            "GetSortCapabilities" => Action::GetSortCapabilities,
            "GetSystemUpdateID" => Action::GetSystemUpdateID,
            "Browse" => Action::Browse,
            "Search" => Action::Search,
            _ => return None,
        })
    }
}

/// Mode de Browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    Metadata,
    DirectChildren,
}

impl BrowseFlag {
    pub fn name(self) -> &'static str {
        match self {
            BrowseFlag::Metadata => "BrowseMetadata",
            BrowseFlag::DirectChildren => "BrowseDirectChildren",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "BrowseMetadata" => BrowseFlag::Metadata,
            "BrowseDirectChildren" => BrowseFlag::DirectChildren,
            _ => return None,
        })
    }
}

/// Résultat d'un Browse/Search : DIDL-Lite sérialisé + compteurs.
#[derive(Debug, Clone, Default)]
pub struct BrowseResult {
    pub didl: String,
    pub number_returned: u32,
    pub total_matches: u32,
    pub update_id: u32,
}

/// Callbacks métier de l'annuaire de contenu.
pub trait ContentDirectoryHandler: Send + Sync {
    fn browse(
        &self,
        object_id: &str,
        flag: BrowseFlag,
        filter: &str,
        starting_index: u32,
        requested_count: u32,
        sort_criteria: &str,
    ) -> Result<BrowseResult, ServiceError>;

    fn search(
        &self,
        _container_id: &str,
        _criteria: &str,
        _filter: &str,
        _starting_index: u32,
        _requested_count: u32,
        _sort_criteria: &str,
    ) -> Result<BrowseResult, ServiceError> {
        Err(ServiceError::OptionalActionNotImplemented("Search".into()))
    }
}

pub struct ContentDirectoryService {
    service_type: ServiceType,
    store: VariableStore<Variable>,
    handler: Arc<dyn ContentDirectoryHandler>,
    publisher: EventPublisher,
}

impl ContentDirectoryService {
    pub fn new(publisher: EventPublisher, handler: Arc<dyn ContentDirectoryHandler>) -> Arc<Self> {
        let service = Arc::new(Self {
            service_type: ServiceType::content_directory(1),
            store: VariableStore::new(),
            handler,
            publisher,
        });

        service.store.set(0, Variable::SystemUpdateID, "0");
        service.store.set(0, Variable::SearchCapabilities, "");
        service.store.set(0, Variable::SortCapabilities, "");

        service
    }

    /// Incrémente SystemUpdateID et notifie les abonnés ; à appeler à
    /// chaque modification du contenu.
    pub fn bump_system_update_id(&self) {
        let next = self
            .store
            .value_of(0, Variable::SystemUpdateID)
            .parse::<u32>()
            .unwrap_or(0)
            .wrapping_add(1);
        self.store
            .set(0, Variable::SystemUpdateID, &next.to_string());
        if let Some(sv) = self.store.get(0, Variable::SystemUpdateID) {
            super::notify_single_variable(&self.publisher, self.service_type, &sv);
        }
    }

    /// Signale les containers modifiés (CSV `id,updateId,…`).
    pub fn notify_container_update(&self, container_update_ids: &str) {
        self.store
            .set(0, Variable::ContainerUpdateIDs, container_update_ids);
        if let Some(sv) = self.store.get(0, Variable::ContainerUpdateIDs) {
            super::notify_single_variable(&self.publisher, self.service_type, &sv);
        }
    }

    pub fn set_search_capabilities(&self, caps: &str) {
        self.store.set(0, Variable::SearchCapabilities, caps);
    }

    pub fn set_sort_capabilities(&self, caps: &str) {
        self.store.set(0, Variable::SortCapabilities, caps);
    }
}

fn parse_u32(request: &SoapAction, name: &str) -> Result<u32, ServiceError> {
    let raw = request.required_arg(name)?;
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ServiceError::ArgumentValueInvalid(format!("{}: {}", name, raw)))
}

fn add_browse_result(response: &mut ActionResponse, result: BrowseResult) {
    response.add_argument("Result", result.didl);
    response.add_argument("NumberReturned", result.number_returned.to_string());
    response.add_argument("TotalMatches", result.total_matches.to_string());
    response.add_argument("UpdateID", result.update_id.to_string());
}

impl ServiceHost for ContentDirectoryService {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn on_action(&self, request: &SoapAction) -> Result<ActionResponse, ServiceError> {
        let action = Action::from_name(&request.name)
            .ok_or_else(|| ServiceError::InvalidAction(request.name.clone()))?;

        let mut response = ActionResponse::new(request.name.clone(), self.service_type);

        match action {
            Action::GetSearchCapabilities => {
                response.add_argument(
                    "SearchCaps",
                    self.store.value_of(0, Variable::SearchCapabilities),
                );
            }
            Action::GetSortCapabilities => {
                response.add_argument(
                    "SortCaps",
                    self.store.value_of(0, Variable::SortCapabilities),
                );
            }
            Action::GetSystemUpdateID => {
                response.add_argument("Id", self.store.value_of(0, Variable::SystemUpdateID));
            }
            Action::Browse => {
                let object_id = request.required_arg("ObjectID")?;
                let raw_flag = request.required_arg("BrowseFlag")?;
                let flag = BrowseFlag::from_name(raw_flag).ok_or_else(|| {
                    ServiceError::ArgumentValueInvalid(format!("BrowseFlag: {}", raw_flag))
                })?;

                let result = self.handler.browse(
                    object_id,
                    flag,
                    request.arg("Filter").unwrap_or("*"),
                    parse_u32(request, "StartingIndex")?,
                    parse_u32(request, "RequestedCount")?,
                    request.arg("SortCriteria").unwrap_or_default(),
                )?;
                add_browse_result(&mut response, result);
            }
            Action::Search => {
                let container_id = request.required_arg("ContainerID")?;
                let result = self.handler.search(
                    container_id,
                    request.arg("SearchCriteria").unwrap_or_default(),
                    request.arg("Filter").unwrap_or("*"),
                    parse_u32(request, "StartingIndex")?,
                    parse_u32(request, "RequestedCount")?,
                    request.arg("SortCriteria").unwrap_or_default(),
                )?;
                add_browse_result(&mut response, result);
            }
        }

        Ok(response)
    }

    fn subscription_response(&self) -> String {
        build_property_set(&[(
            "SystemUpdateID".to_string(),
            self.store.value_of(0, Variable::SystemUpdateID),
        )])
    }

    fn scpd_document(&self) -> ScpdDocument {
        let browse_args = |flag_or_criteria: (&str, &str)| {
            vec![
                arg_in(flag_or_criteria.0, flag_or_criteria.1),
                arg_in("Filter", "A_ARG_TYPE_Filter"),
                arg_in("StartingIndex", "A_ARG_TYPE_Index"),
                arg_in("RequestedCount", "A_ARG_TYPE_Count"),
                arg_in("SortCriteria", "A_ARG_TYPE_SortCriteria"),
                arg_out("Result", "A_ARG_TYPE_Result"),
                arg_out("NumberReturned", "A_ARG_TYPE_Count"),
                arg_out("TotalMatches", "A_ARG_TYPE_Count"),
                arg_out("UpdateID", "A_ARG_TYPE_UpdateID"),
            ]
        };

        let mut browse = vec![arg_in("ObjectID", "A_ARG_TYPE_ObjectID")];
        browse.extend(browse_args(("BrowseFlag", "A_ARG_TYPE_BrowseFlag")));

        let mut search = vec![arg_in("ContainerID", "A_ARG_TYPE_ObjectID")];
        search.extend(browse_args(("SearchCriteria", "A_ARG_TYPE_SearchCriteria")));

        ScpdDocument {
            actions: vec![
                ScpdAction {
                    name: "GetSearchCapabilities".into(),
                    arguments: vec![arg_out("SearchCaps", "SearchCapabilities")],
                },
                ScpdAction {
                    name: "GetSortCapabilities".into(),
                    arguments: vec![arg_out("SortCaps", "SortCapabilities")],
                },
                ScpdAction {
                    name: "GetSystemUpdateID".into(),
                    arguments: vec![arg_out("Id", "SystemUpdateID")],
                },
                ScpdAction {
                    name: "Browse".into(),
                    arguments: browse,
                },
                ScpdAction {
                    name: "Search".into(),
                    arguments: search,
                },
            ],
            state_variables: vec![
                var("SystemUpdateID", "ui4", true),
                var("ContainerUpdateIDs", "string", true),
                var("SearchCapabilities", "string", false),
                var("SortCapabilities", "string", false),
                var("A_ARG_TYPE_ObjectID", "string", false),
                var("A_ARG_TYPE_Result", "string", false),
                ScpdStateVariable {
                    name: "A_ARG_TYPE_BrowseFlag".into(),
                    data_type: "string".into(),
                    send_events: false,
                    allowed_values: vec![
                        "BrowseMetadata".into(),
                        "BrowseDirectChildren".into(),
                    ],
                    default_value: None,
                },
                var("A_ARG_TYPE_Filter", "string", false),
                var("A_ARG_TYPE_SortCriteria", "string", false),
                var("A_ARG_TYPE_SearchCriteria", "string", false),
                var("A_ARG_TYPE_Index", "ui4", false),
                var("A_ARG_TYPE_Count", "ui4", false),
                var("A_ARG_TYPE_UpdateID", "ui4", false),
            ],
        }
    }
}

fn var(name: &str, data_type: &str, send_events: bool) -> ScpdStateVariable {
    ScpdStateVariable {
        name: name.to_string(),
        data_type: data_type.to_string(),
        send_events,
        allowed_values: Vec::new(),
        default_value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_action;

    struct OneTrackHandler;

    impl ContentDirectoryHandler for OneTrackHandler {
        fn browse(
            &self,
            object_id: &str,
            flag: BrowseFlag,
            _filter: &str,
            _starting_index: u32,
            _requested_count: u32,
            _sort_criteria: &str,
        ) -> Result<BrowseResult, ServiceError> {
            if object_id != "0" {
                return Err(ServiceError::upnp(701, "No such object"));
            }
            assert_eq!(flag, BrowseFlag::DirectChildren);
            Ok(BrowseResult {
                didl: "<DIDL-Lite/>".to_string(),
                number_returned: 1,
                total_matches: 1,
                update_id: 1,
            })
        }
    }

    fn service() -> Arc<ContentDirectoryService> {
        ContentDirectoryService::new(EventPublisher::new(), Arc::new(OneTrackHandler))
    }

    fn browse_request(object_id: &str) -> SoapAction {
        let xml = format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <ObjectID>{}</ObjectID>
      <BrowseFlag>BrowseDirectChildren</BrowseFlag>
      <Filter>*</Filter>
      <StartingIndex>0</StartingIndex>
      <RequestedCount>25</RequestedCount>
      <SortCriteria></SortCriteria>
    </u:Browse>
  </s:Body>
</s:Envelope>"#,
            object_id
        );
        parse_soap_action(xml.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn browse_returns_didl_and_counters() {
        let service = service();
        let response = service.on_action(&browse_request("0")).unwrap();
        let names: Vec<&str> = response.arguments().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Result", "NumberReturned", "TotalMatches", "UpdateID"]);
    }

    #[tokio::test]
    async fn browse_unknown_object_is_701() {
        let service = service();
        let err = service.on_action(&browse_request("42")).unwrap_err();
        assert_eq!(err.error_code(), 701);
    }

    #[tokio::test]
    async fn system_update_id_bumps() {
        let service = service();
        service.bump_system_update_id();
        service.bump_system_update_id();

        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetSystemUpdateID xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"/>
  </s:Body>
</s:Envelope>"#;
        let request = parse_soap_action(xml.as_bytes()).unwrap();
        let response = service.on_action(&request).unwrap();
        assert_eq!(response.arguments()[0].1, "2");
    }
}
