//! Agrégateur LastChange.
//!
//! AVTransport et RenderingControl n'émettent pas une notification par
//! variable changée : les changements sont accumulés par instance et
//! émis en un seul document `<Event>` au rythme maximum de un toutes les
//! `min_interval` (200 ms par défaut).
//!
//! Règles d'agrégation :
//! - dans une fenêtre, la dernière valeur d'une variable gagne, mais la
//!   position de la variable dans le lot reste celle de sa première
//!   insertion ;
//! - deux émissions sont séparées d'au moins `min_interval` ;
//! - tout appel à [`add_changed_variable`](LastChangeVariable::add_changed_variable)
//!   est reflété par l'émission suivante.

use std::io::BufReader;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::gena::propertyset::{element_children, local_name};
use crate::types::{ServiceType, ServiceVariable};

/// Fenêtre de coalescence par défaut.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

type EventHandler = Arc<dyn Fn(String) + Send + Sync>;

struct State {
    /// Lots par instance, dans l'ordre d'apparition des instances.
    changed: Vec<(u32, Vec<ServiceVariable>)>,
    last_emit: Instant,
    timer_scheduled: bool,
}

struct Inner {
    metadata_urn: String,
    min_interval: Duration,
    state: Mutex<State>,
    handler: RwLock<Option<EventHandler>>,
}

/// Agrégateur LastChange d'une instance de service.
///
/// Les appels de planification supposent un runtime tokio courant (celui
/// du root device qui héberge le service).
#[derive(Clone)]
pub struct LastChangeVariable {
    inner: Arc<Inner>,
}

impl LastChangeVariable {
    pub fn new(service_type: ServiceType, min_interval: Duration) -> Self {
        let metadata_urn = service_type
            .urn_metadata_string()
            .unwrap_or("urn:schemas-upnp-org:metadata-1-0/AVT/")
            .to_string();

        Self {
            inner: Arc::new(Inner {
                metadata_urn,
                min_interval,
                state: Mutex::new(State {
                    changed: Vec::new(),
                    last_emit: Instant::now(),
                    timer_scheduled: false,
                }),
                handler: RwLock::new(None),
            }),
        }
    }

    /// Enregistre le callback d'émission (le corps du document `<Event>`).
    pub fn on_event(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        *self.inner.handler.write().unwrap() = Some(Arc::new(handler));
    }

    /// Ajoute un changement de variable au lot courant.
    pub fn add_changed_variable(&self, instance_id: u32, var: ServiceVariable) {
        let inner = Arc::clone(&self.inner);
        let mut state = inner.state.lock().unwrap();

        coalesce(&mut state.changed, instance_id, var);

        let now = Instant::now();
        let due = state.last_emit + inner.min_interval;
        if now >= due {
            let event = take_event(&mut state, &inner.metadata_urn, now);
            drop(state);
            dispatch(&inner, event);
        } else if !state.timer_scheduled {
            state.timer_scheduled = true;
            drop(state);

            let timer_inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep_until(due).await;
                let mut state = timer_inner.state.lock().unwrap();
                state.timer_scheduled = false;
                if state.changed.is_empty() {
                    return;
                }
                let event = take_event(&mut state, &timer_inner.metadata_urn, Instant::now());
                drop(state);
                dispatch(&timer_inner, event);
            });
        }
        // Timer déjà posé : le changement vient d'être fusionné dans le lot
        // qu'il émettra.
    }
}

fn coalesce(changed: &mut Vec<(u32, Vec<ServiceVariable>)>, instance_id: u32, var: ServiceVariable) {
    let slot = match changed.iter().position(|(id, _)| *id == instance_id) {
        Some(idx) => idx,
        None => {
            changed.push((instance_id, Vec::new()));
            changed.len() - 1
        }
    };

    let batch = &mut changed[slot].1;
    match batch.iter().position(|existing| existing.name == var.name) {
        Some(idx) => batch[idx] = var,
        None => batch.push(var),
    }
}

fn take_event(state: &mut State, metadata_urn: &str, now: Instant) -> String {
    state.last_emit = now;
    let changed = std::mem::take(&mut state.changed);
    build_last_change_event(metadata_urn, &changed)
}

fn dispatch(inner: &Inner, event: String) {
    debug!("LastChange event: {}", event);
    let handler = inner.handler.read().unwrap().clone();
    match handler {
        Some(handler) => handler(event),
        None => warn!("LastChange event dropped: no handler registered"),
    }
}

/// Sérialise un document `<Event>` LastChange.
///
/// Utilisé par l'agrégateur et par les réponses d'abonnement initiales
/// (état complet du service).
pub fn build_last_change_event(
    metadata_urn: &str,
    instances: &[(u32, Vec<ServiceVariable>)],
) -> String {
    let mut out = format!(r#"<Event xmlns="{}">"#, metadata_urn);
    for (instance_id, vars) in instances {
        out.push_str(&format!(r#"<InstanceID val="{}">"#, instance_id));
        for var in vars {
            out.push('<');
            out.push_str(&var.name);
            out.push_str(&format!(r#" val="{}""#, escape_attribute(&var.value)));
            for (name, value) in &var.attributes {
                out.push_str(&format!(r#" {}="{}""#, name, escape_attribute(value)));
            }
            out.push_str("/>");
        }
        out.push_str("</InstanceID>");
    }
    out.push_str("</Event>");
    out
}

/// Décode un document `<Event>` LastChange en variables groupées par
/// instance, dans l'ordre du document.
pub fn parse_last_change_event(
    xml: &[u8],
) -> Result<Vec<(u32, Vec<(String, String)>)>, xmltree::ParseError> {
    let root = xmltree::Element::parse(BufReader::new(xml))?;

    let mut instances = Vec::new();
    for instance in element_children(&root) {
        if local_name(&instance.name) != "InstanceID" {
            continue;
        }
        let id = instance
            .attributes
            .get("val")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);

        let mut vars = Vec::new();
        for var in element_children(instance) {
            let value = var.attributes.get("val").cloned().unwrap_or_default();
            vars.push((local_name(&var.name).to_string(), value));
        }
        instances.push((id, vars));
    }

    Ok(instances)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
