use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::discovery::DiscoveryEvent;

/// Bus de diffusion des événements de découverte.
///
/// Chaque abonné reçoit sa propre copie ; un abonné disparu (receiver
/// droppé) est purgé au broadcast suivant.
#[derive(Clone, Default)]
pub struct DiscoveryEventBus {
    subscribers: Arc<Mutex<Vec<Sender<DiscoveryEvent>>>>,
}

impl DiscoveryEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<DiscoveryEvent> {
        let (tx, rx) = unbounded::<DiscoveryEvent>();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn broadcast(&self, event: DiscoveryEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
