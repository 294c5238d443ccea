//! Modèle SCPD (Service Control Protocol Description).
//!
//! Le device sérialise ce modèle pour servir `desc.xml` ; le control point
//! le parse pour calculer l'ensemble des actions supportées et la table des
//! variables d'état d'un service distant.

use std::io::BufReader;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::gena::propertyset::element_children;

pub const SCPD_NS: &str = "urn:schemas-upnp-org:service-1-0";

/// Direction d'un argument d'action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct ScpdArgument {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
}

#[derive(Debug, Clone)]
pub struct ScpdAction {
    pub name: String,
    pub arguments: Vec<ScpdArgument>,
}

#[derive(Debug, Clone)]
pub struct ScpdStateVariable {
    pub name: String,
    pub data_type: String,
    pub send_events: bool,
    pub allowed_values: Vec<String>,
    pub default_value: Option<String>,
}

/// Document SCPD complet d'un service.
#[derive(Debug, Clone, Default)]
pub struct ScpdDocument {
    pub actions: Vec<ScpdAction>,
    pub state_variables: Vec<ScpdStateVariable>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScpdError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("Not an SCPD document (missing <scpd> root)")]
    NotScpd,
}

/// Raccourci pour déclarer un argument entrant.
pub fn arg_in(name: &str, related: &str) -> ScpdArgument {
    ScpdArgument {
        name: name.to_string(),
        direction: Direction::In,
        related_state_variable: related.to_string(),
    }
}

/// Raccourci pour déclarer un argument sortant.
pub fn arg_out(name: &str, related: &str) -> ScpdArgument {
    ScpdArgument {
        name: name.to_string(),
        direction: Direction::Out,
        related_state_variable: related.to_string(),
    }
}

impl ScpdDocument {
    pub fn action(&self, name: &str) -> Option<&ScpdAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.name.as_str())
    }

    /// Parse un SCPD téléchargé.
    pub fn parse(xml: &[u8]) -> Result<Self, ScpdError> {
        let root = Element::parse(BufReader::new(xml))?;
        if root.name != "scpd" {
            return Err(ScpdError::NotScpd);
        }

        let mut doc = ScpdDocument::default();

        if let Some(action_list) = root.get_child("actionList") {
            for action in element_children(action_list) {
                if action.name != "action" {
                    continue;
                }
                let Some(name) = child_text(action, "name") else {
                    continue;
                };

                let mut arguments = Vec::new();
                if let Some(arg_list) = action.get_child("argumentList") {
                    for arg in element_children(arg_list) {
                        let Some(arg_name) = child_text(arg, "name") else {
                            continue;
                        };
                        let direction = match child_text(arg, "direction").as_deref() {
                            Some("out") => Direction::Out,
                            _ => Direction::In,
                        };
                        arguments.push(ScpdArgument {
                            name: arg_name,
                            direction,
                            related_state_variable: child_text(arg, "relatedStateVariable")
                                .unwrap_or_default(),
                        });
                    }
                }

                doc.actions.push(ScpdAction { name, arguments });
            }
        }

        if let Some(state_table) = root.get_child("serviceStateTable") {
            for var in element_children(state_table) {
                if var.name != "stateVariable" {
                    continue;
                }
                let Some(name) = child_text(var, "name") else {
                    continue;
                };
                let send_events = var
                    .attributes
                    .get("sendEvents")
                    .map(|v| v.eq_ignore_ascii_case("yes"))
                    .unwrap_or(true);

                let allowed_values = var
                    .get_child("allowedValueList")
                    .map(|list| {
                        element_children(list)
                            .filter(|e| e.name == "allowedValue")
                            .filter_map(|e| e.get_text().map(|t| t.trim().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();

                doc.state_variables.push(ScpdStateVariable {
                    name,
                    data_type: child_text(var, "dataType").unwrap_or_else(|| "string".to_string()),
                    send_events,
                    allowed_values,
                    default_value: child_text(var, "defaultValue"),
                });
            }
        }

        Ok(doc)
    }

    /// Sérialise le document pour le servir en HTTP.
    pub fn to_xml_string(&self) -> Result<String, xmltree::Error> {
        let mut scpd = Element::new("scpd");
        scpd.attributes
            .insert("xmlns".to_string(), SCPD_NS.to_string());

        let mut spec = Element::new("specVersion");
        spec.children.push(XMLNode::Element(text_element("major", "1")));
        spec.children.push(XMLNode::Element(text_element("minor", "0")));
        scpd.children.push(XMLNode::Element(spec));

        let mut action_list = Element::new("actionList");
        for action in &self.actions {
            let mut action_elem = Element::new("action");
            action_elem
                .children
                .push(XMLNode::Element(text_element("name", &action.name)));

            if !action.arguments.is_empty() {
                let mut arg_list = Element::new("argumentList");
                for arg in &action.arguments {
                    let mut arg_elem = Element::new("argument");
                    arg_elem
                        .children
                        .push(XMLNode::Element(text_element("name", &arg.name)));
                    let direction = match arg.direction {
                        Direction::In => "in",
                        Direction::Out => "out",
                    };
                    arg_elem
                        .children
                        .push(XMLNode::Element(text_element("direction", direction)));
                    arg_elem.children.push(XMLNode::Element(text_element(
                        "relatedStateVariable",
                        &arg.related_state_variable,
                    )));
                    arg_list.children.push(XMLNode::Element(arg_elem));
                }
                action_elem.children.push(XMLNode::Element(arg_list));
            }

            action_list.children.push(XMLNode::Element(action_elem));
        }
        scpd.children.push(XMLNode::Element(action_list));

        let mut state_table = Element::new("serviceStateTable");
        for var in &self.state_variables {
            let mut var_elem = Element::new("stateVariable");
            var_elem.attributes.insert(
                "sendEvents".to_string(),
                if var.send_events { "yes" } else { "no" }.to_string(),
            );
            var_elem
                .children
                .push(XMLNode::Element(text_element("name", &var.name)));
            var_elem
                .children
                .push(XMLNode::Element(text_element("dataType", &var.data_type)));

            if !var.allowed_values.is_empty() {
                let mut list = Element::new("allowedValueList");
                for value in &var.allowed_values {
                    list.children
                        .push(XMLNode::Element(text_element("allowedValue", value)));
                }
                var_elem.children.push(XMLNode::Element(list));
            }

            if let Some(default) = &var.default_value {
                var_elem
                    .children
                    .push(XMLNode::Element(text_element("defaultValue", default)));
            }

            state_table.children.push(XMLNode::Element(var_elem));
        }
        scpd.children.push(XMLNode::Element(state_table));

        let mut buf = Vec::new();
        let config = EmitterConfig::new().perform_indent(true).indent_string("  ");
        scpd.write_with_config(&mut buf, config)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|c| c.get_text().map(|t| t.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScpdDocument {
        ScpdDocument {
            actions: vec![
                ScpdAction {
                    name: "Play".to_string(),
                    arguments: vec![
                        arg_in("InstanceID", "A_ARG_TYPE_InstanceID"),
                        arg_in("Speed", "TransportPlaySpeed"),
                    ],
                },
                ScpdAction {
                    name: "GetTransportInfo".to_string(),
                    arguments: vec![
                        arg_in("InstanceID", "A_ARG_TYPE_InstanceID"),
                        arg_out("CurrentTransportState", "TransportState"),
                    ],
                },
            ],
            state_variables: vec![
                ScpdStateVariable {
                    name: "TransportState".to_string(),
                    data_type: "string".to_string(),
                    send_events: false,
                    allowed_values: vec!["STOPPED".to_string(), "PLAYING".to_string()],
                    default_value: None,
                },
                ScpdStateVariable {
                    name: "LastChange".to_string(),
                    data_type: "string".to_string(),
                    send_events: true,
                    allowed_values: Vec::new(),
                    default_value: None,
                },
            ],
        }
    }

    #[test]
    fn scpd_round_trip() {
        let xml = sample().to_xml_string().unwrap();
        let parsed = ScpdDocument::parse(xml.as_bytes()).unwrap();

        let names: Vec<&str> = parsed.action_names().collect();
        assert_eq!(names, ["Play", "GetTransportInfo"]);

        let play = parsed.action("Play").unwrap();
        assert_eq!(play.arguments.len(), 2);
        assert_eq!(play.arguments[0].direction, Direction::In);

        let info = parsed.action("GetTransportInfo").unwrap();
        assert_eq!(info.arguments[1].direction, Direction::Out);

        assert_eq!(parsed.state_variables.len(), 2);
        let transport = &parsed.state_variables[0];
        assert!(!transport.send_events);
        assert_eq!(transport.allowed_values, ["STOPPED", "PLAYING"]);
        assert!(parsed.state_variables[1].send_events);
    }

    #[test]
    fn rejects_non_scpd_document() {
        assert!(matches!(
            ScpdDocument::parse(b"<device/>"),
            Err(ScpdError::NotScpd)
        ));
    }
}
