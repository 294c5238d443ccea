//! Types de base du protocole : services, devices, URNs.
//!
//! Les chaînes URN sont dérivées par des fonctions pures sur les variantes,
//! jamais stockées dans des tables mutables. Pour les tags connus la
//! conversion est bijective : `ServiceType::from_urn_type_string` inverse
//! exactement `urn_type_string`.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Familles de services UPnP AV connues du moteur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    ContentDirectory,
    RenderingControl,
    ConnectionManager,
    AVTransport,
    Unknown,
}

/// Type de service : famille + version.
///
/// L'égalité (et le hash) ne portent que sur la famille ; la version n'est
/// utilisée que pour le formatage des URNs. Deux `AVTransport:1` et
/// `AVTransport:2` désignent donc le même service dans les maps.
#[derive(Debug, Clone, Copy)]
pub struct ServiceType {
    pub kind: ServiceKind,
    pub version: u32,
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl ServiceType {
    pub const fn new(kind: ServiceKind, version: u32) -> Self {
        Self { kind, version }
    }

    pub const fn av_transport(version: u32) -> Self {
        Self::new(ServiceKind::AVTransport, version)
    }

    pub const fn rendering_control(version: u32) -> Self {
        Self::new(ServiceKind::RenderingControl, version)
    }

    pub const fn connection_manager(version: u32) -> Self {
        Self::new(ServiceKind::ConnectionManager, version)
    }

    pub const fn content_directory(version: u32) -> Self {
        Self::new(ServiceKind::ContentDirectory, version)
    }

    /// Nom court du service (tel qu'il apparaît dans les URNs).
    pub fn type_string(&self) -> &'static str {
        match self.kind {
            ServiceKind::ContentDirectory => "ContentDirectory",
            ServiceKind::RenderingControl => "RenderingControl",
            ServiceKind::ConnectionManager => "ConnectionManager",
            ServiceKind::AVTransport => "AVTransport",
            ServiceKind::Unknown => "Unknown",
        }
    }

    /// URN complet du type de service.
    ///
    /// Format : `urn:schemas-upnp-org:service:AVTransport:1`
    pub fn urn_type_string(&self) -> String {
        format!(
            "urn:schemas-upnp-org:service:{}:{}",
            self.type_string(),
            self.version
        )
    }

    /// URN de l'identifiant de service.
    ///
    /// Format : `urn:upnp-org:serviceId:AVTransport`
    pub fn urn_id_string(&self) -> String {
        format!("urn:upnp-org:serviceId:{}", self.type_string())
    }

    /// Namespace du document `<Event>` utilisé par LastChange.
    ///
    /// Seuls AVTransport et RenderingControl publient un LastChange ;
    /// ConnectionManager garde son URN par symétrie avec la source.
    pub fn urn_metadata_string(&self) -> Option<&'static str> {
        match self.kind {
            ServiceKind::AVTransport => Some("urn:schemas-upnp-org:metadata-1-0/AVT/"),
            ServiceKind::RenderingControl => Some("urn:schemas-upnp-org:metadata-1-0/RCS/"),
            ServiceKind::ConnectionManager => Some("urn:schemas-upnp-org:metadata-1-0/CM/"),
            _ => None,
        }
    }

    /// Parse un URN de type (`urn:schemas-upnp-org:service:Name:ver`).
    ///
    /// Un nom inconnu donne `ServiceKind::Unknown`, une version illisible
    /// vaut 1 : les annonces SSDP du terrain sont parfois approximatives.
    pub fn from_urn_type_string(urn: &str) -> Self {
        let mut parts = urn.rsplitn(2, ':');
        let version = parts
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        let rest = parts.next().unwrap_or("");
        let name = rest.rsplit(':').next().unwrap_or("");

        Self::new(service_kind_from_name(name), version)
    }

    /// Parse un URN d'identifiant (`urn:upnp-org:serviceId:Name`).
    pub fn from_urn_id_string(urn: &str) -> Self {
        let name = urn.rsplit(':').next().unwrap_or("");
        Self::new(service_kind_from_name(name), 1)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn_type_string())
    }
}

fn service_kind_from_name(name: &str) -> ServiceKind {
    match name {
        "ContentDirectory" => ServiceKind::ContentDirectory,
        "RenderingControl" => ServiceKind::RenderingControl,
        "ConnectionManager" => ServiceKind::ConnectionManager,
        "AVTransport" => ServiceKind::AVTransport,
        _ => ServiceKind::Unknown,
    }
}

/// Familles de devices UPnP AV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    MediaServer,
    MediaRenderer,
    InternetGateway,
    Unknown,
}

/// Type de device : famille + version, mêmes règles d'égalité que
/// [`ServiceType`].
#[derive(Debug, Clone, Copy)]
pub struct DeviceType {
    pub kind: DeviceKind,
    pub version: u32,
}

impl PartialEq for DeviceType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for DeviceType {}

impl Hash for DeviceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl DeviceType {
    pub const fn new(kind: DeviceKind, version: u32) -> Self {
        Self { kind, version }
    }

    pub const fn media_renderer(version: u32) -> Self {
        Self::new(DeviceKind::MediaRenderer, version)
    }

    pub const fn media_server(version: u32) -> Self {
        Self::new(DeviceKind::MediaServer, version)
    }

    pub fn type_string(&self) -> &'static str {
        match self.kind {
            DeviceKind::MediaServer => "MediaServer",
            DeviceKind::MediaRenderer => "MediaRenderer",
            DeviceKind::InternetGateway => "InternetGatewayDevice",
            DeviceKind::Unknown => "Unknown",
        }
    }

    /// Format : `urn:schemas-upnp-org:device:MediaRenderer:1`
    pub fn urn_type_string(&self) -> String {
        format!(
            "urn:schemas-upnp-org:device:{}:{}",
            self.type_string(),
            self.version
        )
    }

    pub fn from_urn_type_string(urn: &str) -> Self {
        let mut parts = urn.rsplitn(2, ':');
        let version = parts
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        let rest = parts.next().unwrap_or("");
        let name = rest.rsplit(':').next().unwrap_or("");

        let kind = match name {
            "MediaServer" => DeviceKind::MediaServer,
            "MediaRenderer" => DeviceKind::MediaRenderer,
            "InternetGatewayDevice" => DeviceKind::InternetGateway,
            _ => DeviceKind::Unknown,
        };

        Self::new(kind, version)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.urn_type_string())
    }
}

/// Propriétés DIDL-Lite utilisées dans les échanges ContentDirectory
/// (filtres de Browse, critères de tri).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Id,
    ParentId,
    Title,
    Creator,
    Date,
    Description,
    Res,
    Class,
    Restricted,
    WriteStatus,
    RefId,
    ChildCount,
    CreateClass,
    SearchClass,
    Searchable,
    Artist,
    Album,
    AlbumArt,
    Icon,
    Genre,
    TrackNumber,
    Actor,
    StorageUsed,
    All,
    Unknown,
}

impl Property {
    pub fn name(self) -> &'static str {
        match self {
            Property::Id => "id",
            Property::ParentId => "parentID",
            Property::Title => "dc:title",
            Property::Creator => "dc:creator",
            Property::Date => "dc:date",
            Property::Description => "dc:description",
            Property::Res => "res",
            Property::Class => "upnp:class",
            Property::Restricted => "restricted",
            Property::WriteStatus => "writeStatus",
            Property::RefId => "refID",
            Property::ChildCount => "childCount",
            Property::CreateClass => "upnp:createClass",
            Property::SearchClass => "upnp:searchClass",
            Property::Searchable => "searchable",
            Property::Artist => "upnp:artist",
            Property::Album => "upnp:album",
            Property::AlbumArt => "upnp:albumArtURI",
            Property::Icon => "upnp:icon",
            Property::Genre => "upnp:genre",
            Property::TrackNumber => "upnp:originalTrackNumber",
            Property::Actor => "upnp:actor",
            Property::StorageUsed => "upnp:storageUsed",
            Property::All => "*",
            Property::Unknown => "",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "id" => Property::Id,
            "parentID" => Property::ParentId,
            "dc:title" => Property::Title,
            "dc:creator" => Property::Creator,
            "dc:date" => Property::Date,
            "dc:description" => Property::Description,
            "res" => Property::Res,
            "upnp:class" => Property::Class,
            "restricted" => Property::Restricted,
            "writeStatus" => Property::WriteStatus,
            "refID" => Property::RefId,
            "childCount" => Property::ChildCount,
            "upnp:createClass" => Property::CreateClass,
            "upnp:searchClass" => Property::SearchClass,
            "searchable" => Property::Searchable,
            "upnp:artist" => Property::Artist,
            "upnp:album" => Property::Album,
            "upnp:albumArtURI" => Property::AlbumArt,
            "upnp:icon" => Property::Icon,
            "upnp:genre" => Property::Genre,
            "upnp:originalTrackNumber" => Property::TrackNumber,
            "upnp:actor" => Property::Actor,
            "upnp:storageUsed" => Property::StorageUsed,
            "*" => Property::All,
            _ => Property::Unknown,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Variable d'état telle qu'elle circule dans les événements GENA.
///
/// Les attributs (ex: `val="PLAYING"`, `channel="Master"`) sont conservés
/// dans l'ordre d'insertion ; le schéma LastChange en dépend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVariable {
    pub name: String,
    pub value: String,
    pub attributes: Vec<(String, String)>,
}

impl ServiceVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.add_attribute(name, value);
        self
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((name.into(), value.into()));
    }

    /// Élément `<Name val="value" .../>` tel qu'il apparaît dans le
    /// document interne d'un LastChange.
    pub fn to_xml_element(&self) -> xmltree::Element {
        let mut elem = xmltree::Element::new(&self.name);
        elem.attributes
            .insert("val".to_string(), self.value.clone());
        for (name, value) in &self.attributes {
            elem.attributes.insert(name.clone(), value.clone());
        }
        elem
    }
}

/// Charge utile d'une notification GENA décodée, livrée aux listeners.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    /// Identifiant d'abonnement émis par le publisher.
    pub sid: String,
    /// Corps XML (propertyset) tel que reçu.
    pub data: String,
    /// Valeur de l'en-tête SEQ.
    pub sequence: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_urn_round_trip() {
        let all = [
            ServiceType::content_directory(1),
            ServiceType::rendering_control(1),
            ServiceType::connection_manager(1),
            ServiceType::av_transport(1),
        ];

        for st in all {
            let urn = st.urn_type_string();
            let back = ServiceType::from_urn_type_string(&urn);
            assert_eq!(back, st);
            assert_eq!(back.version, st.version);
        }
    }

    #[test]
    fn service_urn_strings() {
        let avt = ServiceType::av_transport(1);
        assert_eq!(
            avt.urn_type_string(),
            "urn:schemas-upnp-org:service:AVTransport:1"
        );
        assert_eq!(avt.urn_id_string(), "urn:upnp-org:serviceId:AVTransport");
        assert_eq!(
            avt.urn_metadata_string(),
            Some("urn:schemas-upnp-org:metadata-1-0/AVT/")
        );
    }

    #[test]
    fn service_equality_ignores_version() {
        let v1 = ServiceType::av_transport(1);
        let v2 = ServiceType::av_transport(2);
        assert_eq!(v1, v2);

        let mut map = std::collections::HashMap::new();
        map.insert(v1, "first");
        map.insert(v2, "second");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn device_urn_round_trip() {
        let all = [
            DeviceType::media_server(1),
            DeviceType::media_renderer(1),
            DeviceType::new(DeviceKind::InternetGateway, 1),
        ];

        for dt in all {
            assert_eq!(DeviceType::from_urn_type_string(&dt.urn_type_string()), dt);
        }
    }

    #[test]
    fn unknown_service_does_not_round_trip_to_known() {
        let st = ServiceType::from_urn_type_string("urn:av-openhome-org:service:Playlist:1");
        assert_eq!(st.kind, ServiceKind::Unknown);
    }

    #[test]
    fn property_round_trip() {
        let all = [
            Property::Id,
            Property::ParentId,
            Property::Title,
            Property::Creator,
            Property::Date,
            Property::Description,
            Property::Res,
            Property::Class,
            Property::Restricted,
            Property::WriteStatus,
            Property::RefId,
            Property::ChildCount,
            Property::CreateClass,
            Property::SearchClass,
            Property::Searchable,
            Property::Artist,
            Property::Album,
            Property::AlbumArt,
            Property::Icon,
            Property::Genre,
            Property::TrackNumber,
            Property::Actor,
            Property::StorageUsed,
            Property::All,
        ];

        for prop in all {
            assert_eq!(Property::from_name(prop.name()), prop);
        }
    }

    #[test]
    fn variable_keeps_attribute_order() {
        let var = ServiceVariable::new("Volume", "40")
            .with_attribute("channel", "Master")
            .with_attribute("extra", "x");
        assert_eq!(var.attributes[0].0, "channel");
        assert_eq!(var.attributes[1].0, "extra");
    }
}
