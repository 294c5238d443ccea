//! Cache de découverte SSDP côté control point.
//!
//! Le [`DeviceTracker`] consomme les événements SSDP, télécharge les
//! descriptions des devices annoncés (pool de workers), maintient un cache
//! par UDN avec TTL glissant et publie `Discovered` / `Disappeared` sur un
//! bus.
//!
//! Règles de cache :
//! - une annonce alive sans `CACHE-CONTROL: max-age` est ignorée ;
//! - un alive pour un UDN connu rafraîchit seulement l'expiration
//!   (dernier écrivain gagnant) ;
//! - byebye, expiration du TTL ou balayage provoquent `Disappeared`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aveupnp::description::Device;
use aveupnp::ssdp::{SsdpClient, SsdpEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::description::fetch_device_description;
use crate::events::DiscoveryEventBus;
use crate::ControlPointConfig;

const FETCH_WORKERS: usize = 3;
const FETCH_QUEUE_DEPTH: usize = 10;

/// Événements publiés par le tracker.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Device annoncé et description parsée.
    Discovered(Arc<Device>),

    /// Device parti (byebye) ou expiré (TTL).
    Disappeared { udn: String },
}

struct CachedDevice {
    device: Arc<Device>,
    expires_at: Instant,
}

struct FetchTask {
    udn: String,
    location: String,
    max_age: u32,
}

struct TrackerInner {
    config: ControlPointConfig,
    cache: Mutex<HashMap<String, CachedDevice>>,
    /// UDNs dont la description est en cours de téléchargement.
    pending: Mutex<HashSet<String>>,
    bus: DiscoveryEventBus,
    running: AtomicBool,
}

/// Cache de devices alimenté par SSDP.
#[derive(Clone)]
pub struct DeviceTracker {
    inner: Arc<TrackerInner>,
    fetch_tx: Sender<FetchTask>,
}

impl DeviceTracker {
    pub fn new(config: ControlPointConfig) -> Self {
        let inner = Arc::new(TrackerInner {
            config,
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            bus: DiscoveryEventBus::new(),
            running: AtomicBool::new(true),
        });

        let (fetch_tx, fetch_rx) = bounded::<FetchTask>(FETCH_QUEUE_DEPTH);

        for _ in 0..FETCH_WORKERS {
            let rx = fetch_rx.clone();
            let inner = Arc::clone(&inner);
            thread::spawn(move || run_fetch_worker(rx, inner));
        }

        {
            let inner = Arc::clone(&inner);
            thread::spawn(move || {
                while inner.running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_secs(1));
                    sweep(&inner);
                }
            });
        }

        Self { inner, fetch_tx }
    }

    /// Flux d'événements de découverte (un receiver par appel).
    pub fn events(&self) -> Receiver<DiscoveryEvent> {
        self.inner.bus.subscribe()
    }

    /// Démarre l'écoute SSDP et lance une première recherche.
    ///
    /// `search_targets` : URNs de device recherchés, ou `ssdp:all`.
    pub fn start(&self, search_targets: &[String]) -> std::io::Result<()> {
        let client = SsdpClient::new(self.inner.config.interface_name.as_deref())?;

        self.search_with(&client, search_targets);

        let tracker = self.clone();
        thread::spawn(move || {
            client.run_event_loop(move |event| tracker.handle_ssdp_event(event));
        });

        Ok(())
    }

    /// Émet les M-SEARCH : trois salves par cible, séparées de délais
    /// aléatoires pour éviter la perte UDP corrélée.
    fn search_with(&self, client: &SsdpClient, search_targets: &[String]) {
        let mx = self.inner.config.search_mx;
        let targets: Vec<String> = if search_targets.is_empty() {
            vec!["ssdp:all".to_string()]
        } else {
            search_targets.to_vec()
        };

        let client = client.clone();
        thread::spawn(move || {
            for round in 0..3 {
                for st in &targets {
                    if let Err(e) = client.send_msearch(st, mx) {
                        warn!("M-SEARCH send failed: {}", e);
                    }
                }
                if round < 2 {
                    let gap = {
                        let mut rng = rand::rng();
                        rng.random_range(0.3..=1.0) * mx.max(1) as f64
                    };
                    thread::sleep(Duration::from_secs_f64(gap));
                }
            }
        });
    }

    /// Injection d'un événement SSDP (appelée par la boucle d'écoute ; les
    /// tests l'utilisent directement).
    pub fn handle_ssdp_event(&self, event: SsdpEvent) {
        match event {
            SsdpEvent::Alive {
                usn,
                location,
                max_age,
                ..
            }
            | SsdpEvent::SearchResponse {
                usn,
                location,
                max_age,
                ..
            } => {
                // Annonce sans durée de vie : inexploitable pour le cache.
                let Some(max_age) = max_age else {
                    debug!("Ignoring announcement without max-age for {}", usn);
                    return;
                };
                let Some(udn) = extract_udn_from_usn(&usn) else {
                    debug!("Ignoring announcement with unparseable USN {}", usn);
                    return;
                };

                self.handle_alive(udn, location, max_age);
            }
            SsdpEvent::ByeBye { usn, .. } => {
                if let Some(udn) = extract_udn_from_usn(&usn) {
                    self.handle_byebye(&udn);
                }
            }
        }
    }

    /// Nombre de devices vivants dans le cache.
    pub fn device_count(&self) -> usize {
        self.inner.cache.lock().unwrap().len()
    }

    /// Device par UDN, s'il est encore valide.
    ///
    /// Un device expiré est évincé ici même si le balayage n'est pas encore
    /// passé : le cache ne rend jamais d'entrée périmée.
    pub fn device(&self, udn: &str) -> Option<Arc<Device>> {
        let mut cache = self.inner.cache.lock().unwrap();
        let entry = cache.get(udn)?;
        if entry.expires_at <= Instant::now() {
            cache.remove(udn);
            self.inner.bus.broadcast(DiscoveryEvent::Disappeared {
                udn: udn.to_string(),
            });
            return None;
        }
        Some(Arc::clone(&entry.device))
    }

    /// Devices vivants.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let now = Instant::now();
        self.inner
            .cache
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.device))
            .collect()
    }

    /// Balayage immédiat des entrées expirées.
    pub fn sweep_once(&self) {
        sweep(&self.inner);
    }

    /// Arrête le thread de balayage (l'écoute SSDP suit le process).
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn handle_alive(&self, udn: String, location: String, max_age: u32) {
        let ttl = Duration::from_secs(max_age as u64);

        {
            let mut cache = self.inner.cache.lock().unwrap();
            if let Some(entry) = cache.get_mut(&udn) {
                // Déjà connu : TTL glissant, pas de nouveau fetch.
                entry.expires_at = Instant::now() + ttl;
                return;
            }
        }

        {
            let mut pending = self.inner.pending.lock().unwrap();
            if !pending.insert(udn.clone()) {
                return;
            }
        }

        let task = FetchTask {
            udn: udn.clone(),
            location,
            max_age,
        };
        if self.fetch_tx.try_send(task).is_err() {
            // File pleine : on retentera à la prochaine annonce.
            self.inner.pending.lock().unwrap().remove(&udn);
        }
    }

    fn handle_byebye(&self, udn: &str) {
        let removed = self.inner.cache.lock().unwrap().remove(udn).is_some();
        if removed {
            info!("👋 Device {} said byebye", udn);
            self.inner.bus.broadcast(DiscoveryEvent::Disappeared {
                udn: udn.to_string(),
            });
        }
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn run_fetch_worker(rx: Receiver<FetchTask>, inner: Arc<TrackerInner>) {
    while let Ok(task) = rx.recv() {
        let result = fetch_device_description(
            &task.udn,
            &task.location,
            inner.config.description_timeout(),
        );

        inner.pending.lock().unwrap().remove(&task.udn);

        match result {
            Ok(device) => {
                let device = Arc::new(device);
                let expires_at = Instant::now() + Duration::from_secs(task.max_age as u64);
                inner.cache.lock().unwrap().insert(
                    task.udn.clone(),
                    CachedDevice {
                        device: Arc::clone(&device),
                        expires_at,
                    },
                );
                info!(
                    "🔎 Discovered {} \"{}\" ({})",
                    device.udn, device.friendly_name, device.device_type
                );
                inner.bus.broadcast(DiscoveryEvent::Discovered(device));
            }
            Err(e) => {
                warn!(
                    "Failed to fetch description for {} at {}: {}",
                    task.udn, task.location, e
                );
            }
        }
    }
}

fn sweep(inner: &TrackerInner) {
    let now = Instant::now();
    let expired: Vec<String> = {
        let mut cache = inner.cache.lock().unwrap();
        let udns: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(udn, _)| udn.clone())
            .collect();
        for udn in &udns {
            cache.remove(udn);
        }
        udns
    };

    for udn in expired {
        info!("⏰ Device {} expired from cache", udn);
        inner.bus.broadcast(DiscoveryEvent::Disappeared { udn });
    }
}

/// Extrait l'UDN (`uuid:…`) d'un USN (`uuid:…::urn:…`).
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let trimmed = usn.trim();
    let lower = trimmed.to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &trimmed[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udn_extraction() {
        assert_eq!(
            extract_udn_from_usn("uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1"),
            Some("uuid:abc".to_string())
        );
        assert_eq!(
            extract_udn_from_usn("uuid:abc"),
            Some("uuid:abc".to_string())
        );
        assert_eq!(extract_udn_from_usn("no-uuid-here"), None);
    }

    #[test]
    fn alive_without_max_age_is_ignored() {
        let tracker = DeviceTracker::new(ControlPointConfig::default());
        tracker.handle_ssdp_event(SsdpEvent::Alive {
            usn: "uuid:abc::upnp:rootdevice".to_string(),
            nt: "upnp:rootdevice".to_string(),
            location: "http://10.0.0.5/desc.xml".to_string(),
            server: "test".to_string(),
            max_age: None,
            from: "10.0.0.5:1900".parse().unwrap(),
        });

        assert_eq!(tracker.device_count(), 0);
        assert!(tracker.inner.pending.lock().unwrap().is_empty());
        tracker.shutdown();
    }

    #[test]
    fn byebye_of_unknown_device_is_silent() {
        let tracker = DeviceTracker::new(ControlPointConfig::default());
        let events = tracker.events();

        tracker.handle_ssdp_event(SsdpEvent::ByeBye {
            usn: "uuid:ghost::upnp:rootdevice".to_string(),
            nt: "upnp:rootdevice".to_string(),
            from: "10.0.0.5:1900".parse().unwrap(),
        });

        assert!(events.try_recv().is_err());
        tracker.shutdown();
    }
}
