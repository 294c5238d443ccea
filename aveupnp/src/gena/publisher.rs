//! Table des abonnements côté device et livraison des NOTIFY.
//!
//! Chaque abonné a son propre compteur de séquence : SEQ 0 pour la
//! notification initiale (état complet), puis 1, 2, … strictement
//! croissants. Au débordement du u32 le compteur repart à 1, le 0 restant
//! réservé à la notification initiale.
//!
//! La livraison passe par une file unique consommée par une seule tâche :
//! l'ordre d'émission est donc l'ordre observé sur le fil, abonnement par
//! abonnement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DEFAULT_SUBSCRIPTION_TIMEOUT, NTS_PROPCHANGE, NT_UPNP_EVENT};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Réponse à un SUBSCRIBE accepté.
#[derive(Debug, Clone)]
pub struct SubscribeResponse {
    pub sid: String,
    pub timeout: Duration,
}

#[derive(Debug)]
struct Subscription {
    service_id: String,
    delivery_url: String,
    expires_at: Instant,
    next_seq: u32,
    failed_once: bool,
}

#[derive(Debug)]
struct Delivery {
    sid: String,
    url: String,
    seq: u32,
    body: String,
}

/// Publisher GENA : une instance par root device, partagée par tous ses
/// services (la clé de routage est l'URN d'identifiant de service).
#[derive(Clone)]
pub struct EventPublisher {
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
}

impl EventPublisher {
    /// Crée le publisher et démarre sa tâche de livraison.
    ///
    /// Doit être appelé depuis un runtime tokio.
    pub fn new() -> Self {
        let subscriptions: Arc<Mutex<HashMap<String, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_delivery_task(delivery_rx, Arc::clone(&subscriptions)));

        Self {
            subscriptions,
            delivery_tx,
        }
    }

    /// Accepte un nouvel abonnement et planifie la notification initiale.
    ///
    /// `callback` est la valeur brute de l'en-tête CALLBACK (chevrons
    /// compris) ; `initial_body` l'état complet du service tel que produit
    /// par son `subscription_response`.
    pub fn subscribe(
        &self,
        service_id: &str,
        callback: &str,
        requested_timeout: Option<Duration>,
        initial_body: String,
    ) -> SubscribeResponse {
        let url = callback
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
            .to_string();
        let timeout = requested_timeout.unwrap_or(DEFAULT_SUBSCRIPTION_TIMEOUT);
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());

        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs.entry(sid.clone()).or_insert(Subscription {
            service_id: service_id.to_string(),
            delivery_url: url.clone(),
            expires_at: Instant::now() + timeout,
            next_seq: 0,
            failed_once: false,
        });
        let seq = advance_seq(sub);
        drop(subs);

        info!("🔒 New subscription {} for {} -> {}", sid, service_id, url);

        let _ = self.delivery_tx.send(Delivery {
            sid: sid.clone(),
            url,
            seq,
            body: initial_body,
        });

        SubscribeResponse { sid, timeout }
    }

    /// Renouvelle un abonnement existant. `None` si le SID est inconnu.
    pub fn renew(&self, sid: &str, requested_timeout: Option<Duration>) -> Option<Duration> {
        let timeout = requested_timeout.unwrap_or(DEFAULT_SUBSCRIPTION_TIMEOUT);
        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs.get_mut(sid)?;
        sub.expires_at = Instant::now() + timeout;
        debug!("♻️ Renewed subscription {} for {}s", sid, timeout.as_secs());
        Some(timeout)
    }

    /// Supprime un abonnement. Idempotent.
    pub fn unsubscribe(&self, sid: &str) -> bool {
        let removed = self.subscriptions.lock().unwrap().remove(sid).is_some();
        if removed {
            info!("❌ Unsubscribed {}", sid);
        }
        removed
    }

    /// Notifie tous les abonnés d'un service avec le même corps.
    ///
    /// Les séquences sont assignées sous le verrou, dans l'ordre d'appel :
    /// deux `notify` successifs sont observés dans cet ordre par chaque
    /// abonné.
    pub fn notify(&self, service_id: &str, body: &str) {
        let mut subs = self.subscriptions.lock().unwrap();
        for (sid, sub) in subs.iter_mut() {
            if sub.service_id != service_id {
                continue;
            }
            let seq = advance_seq(sub);
            let _ = self.delivery_tx.send(Delivery {
                sid: sid.clone(),
                url: sub.delivery_url.clone(),
                seq,
                body: body.to_string(),
            });
        }
    }

    /// Nombre d'abonnés pour un service.
    pub fn subscriber_count(&self, service_id: &str) -> usize {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.service_id == service_id)
            .count()
    }

    /// Retire les abonnements expirés. Retourne les SIDs supprimés.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut subs = self.subscriptions.lock().unwrap();
        let expired: Vec<String> = subs
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in &expired {
            subs.remove(sid);
            info!("⏰ Subscription {} expired", sid);
        }
        expired
    }

    /// Démarre le balayage périodique des abonnements expirés (1 Hz).
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let publisher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                publisher.sweep_expired();
            }
        })
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Séquence courante, puis avance avec retour à 1 après u32::MAX.
fn advance_seq(sub: &mut Subscription) -> u32 {
    let seq = sub.next_seq;
    sub.next_seq = seq.checked_add(1).unwrap_or(1);
    seq
}

async fn run_delivery_task(
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
) {
    let client = reqwest::Client::builder()
        .timeout(NOTIFY_TIMEOUT)
        .build()
        .expect("reqwest client");

    while let Some(delivery) = rx.recv().await {
        let result = client
            .request(
                reqwest::Method::from_bytes(b"NOTIFY").unwrap(),
                &delivery.url,
            )
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("NT", NT_UPNP_EVENT)
            .header("NTS", NTS_PROPCHANGE)
            .header("SID", &delivery.sid)
            .header("SEQ", delivery.seq.to_string())
            .body(delivery.body)
            .send()
            .await;

        let delivered = match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    "NOTIFY to {} rejected with status {}",
                    delivery.url,
                    resp.status()
                );
                false
            }
            Err(err) => {
                warn!("NOTIFY to {} failed: {}", delivery.url, err);
                false
            }
        };

        let mut subs = subscriptions.lock().unwrap();
        if let Some(sub) = subs.get_mut(&delivery.sid) {
            if delivered {
                sub.failed_once = false;
            } else if sub.failed_once {
                // Deuxième échec consécutif : l'abonné est considéré parti.
                subs.remove(&delivery.sid);
                info!("❌ Dropping subscription {} after repeated delivery failures", delivery.sid);
            } else {
                sub.failed_once = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequences_are_per_subscriber_and_monotone() {
        let publisher = EventPublisher::new();

        let first = publisher.subscribe(
            "urn:upnp-org:serviceId:AVTransport",
            "<http://127.0.0.1:1/>",
            Some(Duration::from_secs(300)),
            "<e:propertyset/>".to_string(),
        );
        let second = publisher.subscribe(
            "urn:upnp-org:serviceId:AVTransport",
            "<http://127.0.0.1:2/>",
            Some(Duration::from_secs(300)),
            "<e:propertyset/>".to_string(),
        );
        assert_ne!(first.sid, second.sid);

        publisher.notify("urn:upnp-org:serviceId:AVTransport", "<e:propertyset/>");
        publisher.notify("urn:upnp-org:serviceId:AVTransport", "<e:propertyset/>");

        let subs = publisher.subscriptions.lock().unwrap();
        for sub in subs.values() {
            // initial (0) + deux notifications -> la prochaine est 3
            assert_eq!(sub.next_seq, 3);
        }
    }

    #[tokio::test]
    async fn sequence_wrap_skips_zero() {
        let publisher = EventPublisher::new();
        let resp = publisher.subscribe(
            "urn:upnp-org:serviceId:RenderingControl",
            "<http://127.0.0.1:1/>",
            None,
            String::new(),
        );

        {
            let mut subs = publisher.subscriptions.lock().unwrap();
            let sub = subs.get_mut(&resp.sid).unwrap();
            sub.next_seq = u32::MAX;
            assert_eq!(advance_seq(sub), u32::MAX);
            assert_eq!(sub.next_seq, 1);
        }
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let publisher = EventPublisher::new();
        let resp = publisher.subscribe(
            "urn:upnp-org:serviceId:AVTransport",
            "<http://127.0.0.1:1/>",
            None,
            String::new(),
        );

        assert!(publisher.unsubscribe(&resp.sid));
        assert!(!publisher.unsubscribe(&resp.sid));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_subscriptions() {
        let publisher = EventPublisher::new();
        publisher.subscribe(
            "urn:upnp-org:serviceId:AVTransport",
            "<http://127.0.0.1:1/>",
            Some(Duration::from_secs(2)),
            String::new(),
        );

        assert!(publisher.sweep_expired().is_empty());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(publisher.sweep_expired().len(), 1);
        assert_eq!(
            publisher.subscriber_count("urn:upnp-org:serviceId:AVTransport"),
            0
        );
    }
}
