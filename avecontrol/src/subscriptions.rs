//! Abonnements GENA côté subscriber.
//!
//! L'[`EventRuntime`] tient :
//!
//! - un listener HTTP (port éphémère) qui reçoit les NOTIFY des publishers
//!   et les pousse vers le worker ;
//! - un worker qui route les notifications vers les abonnements (contrôle
//!   du SID et de la séquence) et renouvelle les abonnements à 80 % de
//!   leur timeout.
//!
//! Séquences : le premier NOTIFY d'un abonnement porte SEQ=0, les suivants
//! s'incrémentent de 1 (modulo 2³², le 0 restant réservé). Un trou ou un
//! recul déclenche une resynchronisation : unsubscribe + subscribe à
//! l'identique, mêmes canaux de livraison. Si la resynchronisation échoue,
//! l'abonné reçoit `Lost`.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aveupnp::gena::{format_timeout_header, parse_timeout_header, NTS_PROPCHANGE, NT_UPNP_EVENT};
use aveupnp::types::SubscriptionEvent;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};
use ureq::{http, Agent};

use crate::errors::ControlError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_LOOP_INTERVAL: Duration = Duration::from_millis(250);
const RENEWAL_FRACTION: f64 = 0.8;

/// Ce qu'un abonnement reçoit.
#[derive(Debug, Clone)]
pub enum SubscriptionMessage {
    /// Notification décodée (corps propertyset brut + séquence).
    Event(SubscriptionEvent),

    /// L'abonnement est mort (renouvellement ou resynchronisation en
    /// échec) ; plus rien ne suivra.
    Lost(String),
}

struct IncomingNotify {
    path: String,
    sid: Option<String>,
    seq: Option<u32>,
    body: Vec<u8>,
}

struct Entry {
    event_url: String,
    callback_url: String,
    callback_path: String,
    sid: String,
    timeout: Duration,
    subscribed_at: Instant,
    last_seq: Option<u32>,
    tx: Sender<SubscriptionMessage>,
}

struct RuntimeInner {
    entries: Mutex<HashMap<u64, Entry>>,
    path_index: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
    listener_port: u16,
    /// Hôte (formaté, crochets IPv6 compris) annoncé dans les CALLBACK,
    /// déterminé au premier abonnement.
    callback_host: Mutex<Option<String>>,
    running: AtomicBool,
}

/// Runtime des abonnements GENA d'un control point (un par process
/// suffit ; tous les abonnements partagent le listener).
#[derive(Clone)]
pub struct EventRuntime {
    inner: Arc<RuntimeInner>,
}

impl EventRuntime {
    /// Lie le listener NOTIFY et démarre le worker.
    pub fn new() -> io::Result<Self> {
        let listener = TcpListener::bind("0.0.0.0:0")?;
        let listener_port = listener.local_addr()?.port();

        info!("✅ GENA notify listener bound on port {}", listener_port);

        let (notify_tx, notify_rx) = unbounded::<IncomingNotify>();

        thread::Builder::new()
            .name("gena-notify-http".into())
            .spawn(move || run_notify_listener(listener, notify_tx))?;

        let inner = Arc::new(RuntimeInner {
            entries: Mutex::new(HashMap::new()),
            path_index: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            listener_port,
            callback_host: Mutex::new(None),
            running: AtomicBool::new(true),
        });

        {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("gena-worker".into())
                .spawn(move || run_worker(inner, notify_rx))?;
        }

        Ok(Self { inner })
    }

    /// S'abonne à une URL d'événement.
    ///
    /// Une réponse SUBSCRIBE sans en-tête SID est une `InvalidResponse`.
    /// Le handle rendu se désabonne à son drop.
    pub fn subscribe(
        &self,
        event_url: &str,
        requested_timeout: Duration,
    ) -> Result<Subscription, ControlError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let callback_path = format!("/events/{}", id);
        let callback_url = self.callback_url_for(event_url, &callback_path)?;

        let (sid, timeout) =
            do_subscribe(event_url, &callback_url, requested_timeout)?;

        info!(
            "🔒 Subscribed to {} (SID {}, timeout {}s)",
            event_url,
            sid,
            timeout.as_secs()
        );

        let (tx, rx) = unbounded::<SubscriptionMessage>();
        let entry = Entry {
            event_url: event_url.to_string(),
            callback_url,
            callback_path: callback_path.clone(),
            sid: sid.clone(),
            timeout,
            subscribed_at: Instant::now(),
            last_seq: None,
            tx,
        };

        self.inner.entries.lock().unwrap().insert(id, entry);
        self.inner.path_index.lock().unwrap().insert(callback_path, id);

        Ok(Subscription {
            runtime: self.clone(),
            id,
            initial_sid: sid,
            rx,
            closed: AtomicBool::new(false),
        })
    }

    /// Désabonne par identifiant interne. Idempotent : un second appel ne
    /// fait rien.
    pub fn unsubscribe(&self, id: u64) {
        let entry = {
            let mut entries = self.inner.entries.lock().unwrap();
            entries.remove(&id)
        };
        let Some(entry) = entry else {
            return;
        };
        self.inner
            .path_index
            .lock()
            .unwrap()
            .remove(&entry.callback_path);

        // Les erreurs de teardown ne remontent jamais au caller.
        do_unsubscribe(&entry.event_url, &entry.sid);
    }

    /// SID courant d'un abonnement (change après resynchronisation).
    pub fn sid_of(&self, id: u64) -> Option<String> {
        self.inner
            .entries
            .lock()
            .unwrap()
            .get(&id)
            .map(|e| e.sid.clone())
    }

    /// Arrête le worker. Les opérations en vol échouent en erreur réseau.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn callback_url_for(&self, event_url: &str, path: &str) -> Result<String, ControlError> {
        let cached = self.inner.callback_host.lock().unwrap().clone();
        let host = match cached {
            Some(host) => host,
            None => {
                let host = EventAuthority::of(event_url)?.local_callback_host()?;
                *self.inner.callback_host.lock().unwrap() = Some(host.clone());
                host
            }
        };

        Ok(format!(
            "http://{}:{}{}",
            host, self.inner.listener_port, path
        ))
    }
}

/// Handle d'abonnement. Drop = UNSUBSCRIBE.
pub struct Subscription {
    runtime: EventRuntime,
    id: u64,
    initial_sid: String,
    rx: Receiver<SubscriptionMessage>,
    closed: AtomicBool,
}

impl Subscription {
    /// Flux des notifications et de l'éventuel `Lost` final.
    pub fn messages(&self) -> &Receiver<SubscriptionMessage> {
        &self.rx
    }

    /// SID au moment de l'abonnement.
    pub fn initial_sid(&self) -> &str {
        &self.initial_sid
    }

    /// SID courant (après resynchronisations éventuelles).
    pub fn sid(&self) -> Option<String> {
        self.runtime.sid_of(self.id)
    }

    /// Ferme l'abonnement. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.runtime.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// HTTP SUBSCRIBE / UNSUBSCRIBE

fn build_agent() -> Agent {
    Agent::config_builder()
        .timeout_global(Some(HTTP_TIMEOUT))
        .http_status_as_error(false)
        .allow_non_standard_methods(true)
        .build()
        .into()
}

fn do_subscribe(
    event_url: &str,
    callback_url: &str,
    requested_timeout: Duration,
) -> Result<(String, Duration), ControlError> {
    let authority = EventAuthority::of(event_url)?;

    let request = http::Request::builder()
        .method("SUBSCRIBE")
        .uri(event_url)
        .header("HOST", authority.host_header())
        .header("CALLBACK", format!("<{}>", callback_url))
        .header("NT", NT_UPNP_EVENT)
        .header("TIMEOUT", format_timeout_header(requested_timeout))
        .body(())
        .map_err(|e| ControlError::invalid_response(e.to_string()))?;

    let response = build_agent().run(request)?;
    if !response.status().is_success() {
        return Err(ControlError::Http(response.status().as_u16()));
    }

    let sid = response
        .headers()
        .get("SID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ControlError::invalid_response("SUBSCRIBE response without SID"))?;

    let timeout = response
        .headers()
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout_header)
        .unwrap_or(requested_timeout);

    Ok((sid, timeout))
}

fn do_renew(event_url: &str, sid: &str, requested_timeout: Duration) -> Result<Duration, ControlError> {
    let authority = EventAuthority::of(event_url)?;

    let request = http::Request::builder()
        .method("SUBSCRIBE")
        .uri(event_url)
        .header("HOST", authority.host_header())
        .header("SID", sid)
        .header("TIMEOUT", format_timeout_header(requested_timeout))
        .body(())
        .map_err(|e| ControlError::invalid_response(e.to_string()))?;

    let response = build_agent().run(request)?;
    if !response.status().is_success() {
        return Err(ControlError::Http(response.status().as_u16()));
    }

    Ok(response
        .headers()
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout_header)
        .unwrap_or(requested_timeout))
}

fn do_unsubscribe(event_url: &str, sid: &str) {
    let Ok(authority) = EventAuthority::of(event_url) else {
        return;
    };

    let request = match http::Request::builder()
        .method("UNSUBSCRIBE")
        .uri(event_url)
        .header("HOST", authority.host_header())
        .header("SID", sid)
        .body(())
    {
        Ok(req) => req,
        Err(e) => {
            warn!("Failed to build UNSUBSCRIBE request: {}", e);
            return;
        }
    };

    match build_agent().run(request) {
        Ok(response) if response.status().is_success() => {
            debug!("Unsubscribed {} from {}", sid, event_url);
        }
        Ok(response) => {
            warn!(
                "UNSUBSCRIBE {} returned status {}",
                event_url,
                response.status()
            );
        }
        Err(e) => {
            warn!("UNSUBSCRIBE request to {} failed: {}", event_url, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Listener NOTIFY

/// Raisons de refus d'une requête entrante sur le port de callback.
#[derive(Debug)]
enum NotifyReject {
    /// Flux illisible ou requête tronquée.
    Unreadable(io::Error),

    /// Autre méthode que NOTIFY (les publishers n'ont rien d'autre à nous
    /// dire).
    NotANotify(String),

    /// NOTIFY sans les en-têtes d'événement GENA (NT: upnp:event,
    /// NTS: upnp:propchange).
    NotAPropchange,
}

impl NotifyReject {
    fn status_line(&self) -> &'static str {
        match self {
            NotifyReject::Unreadable(_) => "400 Bad Request",
            NotifyReject::NotANotify(_) => "405 Method Not Allowed",
            NotifyReject::NotAPropchange => "412 Precondition Failed",
        }
    }
}

fn run_notify_listener(listener: TcpListener, notify_tx: Sender<IncomingNotify>) {
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                if let Err(e) = stream.set_read_timeout(Some(HTTP_TIMEOUT)) {
                    warn!("Failed to set read timeout on notify connection: {}", e);
                }

                match decode_notify(&mut stream) {
                    Ok(notify) => {
                        if notify_tx.send(notify).is_err() {
                            warn!("Dropping notify because worker channel is closed");
                        }
                        acknowledge(&mut stream, "200 OK");
                    }
                    Err(reject) => {
                        warn!("Rejecting callback request: {:?}", reject);
                        acknowledge(&mut stream, reject.status_line());
                    }
                }
            }
            Err(e) => {
                warn!("Incoming notify connection failed: {}", e);
            }
        }
    }
}

/// Décode une requête du port de callback en [`IncomingNotify`].
///
/// Seuls les en-têtes qui portent du sens GENA sont retenus (SID, SEQ,
/// NT/NTS, Content-Length) ; tout le reste est ignoré à la volée.
fn decode_notify(stream: &mut TcpStream) -> Result<IncomingNotify, NotifyReject> {
    let mut reader = BufReader::new(stream.try_clone().map_err(NotifyReject::Unreadable)?);

    let request_line = read_header_line(&mut reader)?
        .ok_or_else(|| NotifyReject::Unreadable(io::ErrorKind::UnexpectedEof.into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_ascii_uppercase();
    let path = parts.next().unwrap_or("/").to_string();

    if method != "NOTIFY" {
        return Err(NotifyReject::NotANotify(method));
    }

    let mut sid = None;
    let mut seq = None;
    let mut nt_is_event = false;
    let mut nts_is_propchange = false;
    let mut content_length = 0usize;

    while let Some(line) = read_header_line(&mut reader)? {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "sid" => sid = Some(value.to_string()),
            "seq" => seq = value.parse::<u32>().ok(),
            "nt" => nt_is_event = value.eq_ignore_ascii_case(NT_UPNP_EVENT),
            "nts" => nts_is_propchange = value.eq_ignore_ascii_case(NTS_PROPCHANGE),
            "content-length" => content_length = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    if !nt_is_event || !nts_is_propchange {
        return Err(NotifyReject::NotAPropchange);
    }

    let mut body = vec![0u8; content_length];
    reader
        .read_exact(&mut body)
        .map_err(NotifyReject::Unreadable)?;

    Ok(IncomingNotify {
        path,
        sid,
        seq,
        body,
    })
}

/// Ligne d'en-tête suivante, `None` sur la ligne vide ou la fin de flux.
fn read_header_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, NotifyReject> {
    let mut line = String::new();
    if reader.read_line(&mut line).map_err(NotifyReject::Unreadable)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// Réponse minimale au publisher ; son sort ne nous concerne plus.
fn acknowledge(stream: &mut TcpStream, status_line: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status_line
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("Failed to acknowledge notify: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Worker

fn run_worker(inner: Arc<RuntimeInner>, notify_rx: Receiver<IncomingNotify>) {
    // Un NOTIFY peut doubler la réponse du SUBSCRIBE qui enregistre son
    // chemin (la notification initiale part dès l'acceptation) : un chemin
    // encore inconnu est regardé une seconde fois au tick suivant.
    let mut deferred: Vec<IncomingNotify> = Vec::new();

    while inner.running.load(Ordering::SeqCst) {
        for notify in deferred.drain(..) {
            if let Some(notify) = handle_notify(&inner, notify) {
                debug!("Dropping notify for unknown path {}", notify.path);
            }
        }
        while let Ok(notify) = notify_rx.try_recv() {
            if let Some(notify) = handle_notify(&inner, notify) {
                deferred.push(notify);
            }
        }
        renew_expiring(&inner);
        thread::sleep(WORKER_LOOP_INTERVAL);
    }
}

/// Rend la notification si son chemin est inconnu (candidate au report).
fn handle_notify(inner: &RuntimeInner, notify: IncomingNotify) -> Option<IncomingNotify> {
    let Some(id) = inner.path_index.lock().unwrap().get(&notify.path).copied() else {
        return Some(notify);
    };

    enum Verdict {
        Deliver(SubscriptionEvent),
        Resync,
        Ignore,
    }

    let verdict = {
        let mut entries = inner.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&id) else {
            return None;
        };

        // SID inconnu ou différent : notification ignorée.
        let sid_matches = notify
            .sid
            .as_deref()
            .map(|sid| sid.eq_ignore_ascii_case(&entry.sid))
            .unwrap_or(false);
        if !sid_matches {
            debug!(
                "Ignoring notify with mismatched SID (expected {}, got {:?})",
                entry.sid, notify.sid
            );
            Verdict::Ignore
        } else {
            match (entry.last_seq, notify.seq) {
                (_, None) => {
                    warn!("Notify without SEQ on {}, resyncing", entry.event_url);
                    Verdict::Resync
                }
                (None, Some(seq)) => {
                    entry.last_seq = Some(seq);
                    Verdict::Deliver(SubscriptionEvent {
                        sid: entry.sid.clone(),
                        data: String::from_utf8_lossy(&notify.body).into_owned(),
                        sequence: seq,
                    })
                }
                (Some(last), Some(seq)) => {
                    // Incrément de 1, le 0 étant réservé au premier envoi.
                    let expected = last.checked_add(1).unwrap_or(1);
                    if seq == expected {
                        entry.last_seq = Some(seq);
                        Verdict::Deliver(SubscriptionEvent {
                            sid: entry.sid.clone(),
                            data: String::from_utf8_lossy(&notify.body).into_owned(),
                            sequence: seq,
                        })
                    } else {
                        warn!(
                            "SEQ discontinuity on {} (expected {}, got {}), resyncing",
                            entry.event_url, expected, seq
                        );
                        Verdict::Resync
                    }
                }
            }
        }
    };

    match verdict {
        Verdict::Deliver(event) => {
            let entries = inner.entries.lock().unwrap();
            if let Some(entry) = entries.get(&id) {
                let _ = entry.tx.send(SubscriptionMessage::Event(event));
            }
        }
        Verdict::Resync => resync(inner, id),
        Verdict::Ignore => {}
    }

    None
}

/// Resynchronisation : unsubscribe + subscribe frais, mêmes canaux.
fn resync(inner: &RuntimeInner, id: u64) {
    let (event_url, callback_url, old_sid, timeout) = {
        let entries = inner.entries.lock().unwrap();
        let Some(entry) = entries.get(&id) else {
            return;
        };
        (
            entry.event_url.clone(),
            entry.callback_url.clone(),
            entry.sid.clone(),
            entry.timeout,
        )
    };

    do_unsubscribe(&event_url, &old_sid);

    match do_subscribe(&event_url, &callback_url, timeout) {
        Ok((sid, timeout)) => {
            let mut entries = inner.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&id) {
                info!("♻️ Resynced subscription on {} (new SID {})", event_url, sid);
                entry.sid = sid;
                entry.timeout = timeout;
                entry.subscribed_at = Instant::now();
                entry.last_seq = None;
            }
        }
        Err(e) => {
            warn!("Resync failed on {}: {}", event_url, e);
            drop_subscription(inner, id, format!("resync failed: {}", e));
        }
    }
}

/// Renouvelle à 80 % du timeout ; un échec est retenté immédiatement une
/// fois avant de déclarer l'abonnement perdu.
fn renew_expiring(inner: &Arc<RuntimeInner>) {
    let now = Instant::now();
    let due: Vec<(u64, String, String, Duration)> = {
        let entries = inner.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, e)| {
                now.duration_since(e.subscribed_at) >= e.timeout.mul_f64(RENEWAL_FRACTION)
            })
            .map(|(id, e)| (*id, e.event_url.clone(), e.sid.clone(), e.timeout))
            .collect()
    };

    for (id, event_url, sid, timeout) in due {
        let result = do_renew(&event_url, &sid, timeout)
            .or_else(|first| {
                debug!("Renewal retry on {} after: {}", event_url, first);
                do_renew(&event_url, &sid, timeout)
            });

        match result {
            Ok(granted) => {
                let mut entries = inner.entries.lock().unwrap();
                if let Some(entry) = entries.get_mut(&id) {
                    entry.timeout = granted;
                    entry.subscribed_at = Instant::now();
                    debug!("♻️ Renewed {} for {}s", sid, granted.as_secs());
                }
            }
            Err(e) => {
                warn!("Renewal failed on {}: {}", event_url, e);
                drop_subscription(inner, id, format!("renewal failed: {}", e));
            }
        }
    }
}

fn drop_subscription(inner: &RuntimeInner, id: u64, reason: String) {
    let entry = inner.entries.lock().unwrap().remove(&id);
    if let Some(entry) = entry {
        inner
            .path_index
            .lock()
            .unwrap()
            .remove(&entry.callback_path);
        let _ = entry.tx.send(SubscriptionMessage::Lost(reason));
    }
}

// ---------------------------------------------------------------------------
// Réseau

/// Autorité (hôte + port) d'une URL d'événement.
///
/// C'est la seule décomposition d'URL dont GENA a besoin : l'en-tête HOST
/// des SUBSCRIBE/UNSUBSCRIBE, et le choix de l'adresse locale à annoncer
/// dans le CALLBACK.
#[derive(Debug, PartialEq, Eq)]
struct EventAuthority {
    host: String,
    port: u16,
    ipv6: bool,
}

impl EventAuthority {
    fn of(event_url: &str) -> Result<Self, ControlError> {
        let bad_url =
            || ControlError::invalid_response(format!("bad event URL {}", event_url));

        let (scheme, rest) = event_url.split_once("://").ok_or_else(bad_url)?;
        let default_port = if scheme.eq_ignore_ascii_case("https") {
            443
        } else {
            80
        };
        let authority = rest.split('/').next().unwrap_or(rest).trim();
        if authority.is_empty() {
            return Err(bad_url());
        }

        if let Some(stripped) = authority.strip_prefix('[') {
            let end = stripped.find(']').ok_or_else(bad_url)?;
            let port = match stripped[end + 1..].strip_prefix(':') {
                Some(raw) => raw.parse().map_err(|_| bad_url())?,
                None => default_port,
            };
            Ok(Self {
                host: stripped[..end].to_string(),
                port,
                ipv6: true,
            })
        } else {
            let (host, port) = match authority.split_once(':') {
                Some((host, raw)) => (host, raw.parse().map_err(|_| bad_url())?),
                None => (authority, default_port),
            };
            Ok(Self {
                host: host.to_string(),
                port,
                ipv6: false,
            })
        }
    }

    /// Valeur de l'en-tête HOST.
    fn host_header(&self) -> String {
        if self.ipv6 {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Hôte local à annoncer dans un CALLBACK vers ce publisher : l'adresse
    /// source que le noyau choisirait pour lui parler (socket UDP connecté,
    /// aucun trafic émis), crochets IPv6 compris.
    fn local_callback_host(&self) -> io::Result<String> {
        let bind_addr = if self.ipv6 { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect((self.host.as_str(), self.port))?;

        Ok(match socket.local_addr()?.ip() {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_authority_parsing() {
        let authority =
            EventAuthority::of("http://10.0.0.5:8080/service/AVTransport/event").unwrap();
        assert_eq!(authority.host, "10.0.0.5");
        assert_eq!(authority.port, 8080);
        assert_eq!(authority.host_header(), "10.0.0.5:8080");

        let default_port = EventAuthority::of("http://10.0.0.5/event").unwrap();
        assert_eq!(default_port.port, 80);

        let v6 = EventAuthority::of("http://[fe80::1]:9000/event").unwrap();
        assert_eq!(v6.host, "fe80::1");
        assert_eq!(v6.port, 9000);
        assert_eq!(v6.host_header(), "[fe80::1]:9000");

        assert!(EventAuthority::of("not a url").is_err());
        assert!(EventAuthority::of("http://10.0.0.5:notaport/x").is_err());
    }

    #[test]
    fn seq_expectations() {
        // la règle de wrap : après u32::MAX on attend 1, jamais 0
        assert_eq!(41u32.checked_add(1).unwrap_or(1), 42);
        assert_eq!(u32::MAX.checked_add(1).unwrap_or(1), 1);
    }
}
