//! Serveur SSDP : annonces périodiques et réponses aux M-SEARCH.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Ce qu'un root device annonce sur le réseau.
#[derive(Debug, Clone)]
pub struct SsdpAnnouncement {
    /// UUID du device (sans le préfixe "uuid:").
    pub uuid: String,

    /// URN du type de device.
    pub device_type: String,

    /// URL de la description.
    pub location: String,

    /// En-tête SERVER (ex: "Linux/6.1 UPnP/1.1 AVE/1.0").
    pub server: String,

    /// Types de notification (NT) annoncés : uuid, rootdevice, type de
    /// device, et un par service.
    pub notification_types: Vec<String>,
}

impl SsdpAnnouncement {
    pub fn new(uuid: String, device_type: String, location: String, server: String) -> Self {
        let notification_types = vec![
            format!("uuid:{}", uuid),
            "upnp:rootdevice".to_string(),
            device_type.clone(),
        ];

        Self {
            uuid,
            device_type,
            location,
            server,
            notification_types,
        }
    }

    /// Ajoute un NT (typiquement l'URN d'un service hébergé).
    pub fn add_notification_type(&mut self, nt: String) {
        if !self.notification_types.contains(&nt) {
            self.notification_types.push(nt);
        }
    }

    fn usn_for(&self, nt: &str) -> String {
        if nt.starts_with("uuid:") {
            nt.to_string()
        } else {
            format!("uuid:{}::{}", self.uuid, nt)
        }
    }
}

/// Serveur SSDP : lié à 0.0.0.0:1900, membre du groupe multicast.
pub struct SsdpServer {
    devices: Arc<RwLock<HashMap<String, SsdpAnnouncement>>>,
    socket: Option<Arc<UdpSocket>>,
    running: Arc<AtomicBool>,
    advertise_interval: Duration,
}

impl SsdpServer {
    pub fn new(advertise_interval: Duration) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            socket: None,
            running: Arc::new(AtomicBool::new(false)),
            advertise_interval,
        }
    }

    /// Lie le socket, rejoint le groupe multicast et démarre les threads
    /// d'annonces périodiques et d'écoute des M-SEARCH.
    pub fn start(&mut self) -> std::io::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", SSDP_PORT))?;
        socket.join_multicast_v4(
            &SSDP_MULTICAST_ADDR.parse().unwrap(),
            &"0.0.0.0".parse().unwrap(),
        )?;
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_ttl_v4(super::MULTICAST_TTL)?;
        // Loopback actif : un control point sur la même machine doit voir
        // nos annonces.
        socket.set_multicast_loop_v4(true)?;

        let socket = Arc::new(socket);
        self.socket = Some(socket.clone());
        self.running.store(true, Ordering::SeqCst);

        info!("✅ SSDP server started on {}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT);

        self.start_periodic_announcements(socket.clone());
        self.start_msearch_listener(socket);

        Ok(())
    }

    /// Arrête les threads et envoie un byebye pour chaque device.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(socket) = self.socket.take() {
            info!("👋 SSDP server stopping, sending byebye");
            let devices = self.devices.read().unwrap();
            for device in devices.values() {
                for nt in &device.notification_types {
                    send_byebye(&socket, device, nt);
                }
            }
        }
    }

    /// Enregistre un device et annonce immédiatement tous ses NTs.
    pub fn add_device(&self, device: SsdpAnnouncement) {
        let uuid = device.uuid.clone();
        self.devices.write().unwrap().insert(uuid, device.clone());

        if let Some(ref socket) = self.socket {
            for nt in &device.notification_types {
                send_alive(socket, &device, nt);
            }
        }
    }

    /// Retire un device et envoie son byebye.
    pub fn remove_device(&self, uuid: &str) {
        let removed = self.devices.write().unwrap().remove(uuid);
        if let (Some(device), Some(ref socket)) = (removed, &self.socket) {
            for nt in &device.notification_types {
                send_byebye(socket, &device, nt);
            }
        }
    }

    /// Annonces périodiques : toutes les `advertise_interval / 2`, avec un
    /// jitter uniforme de ±25 % pour ne pas synchroniser les devices d'un
    /// même réseau.
    fn start_periodic_announcements(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let running = Arc::clone(&self.running);
        let base = self.advertise_interval / 2;

        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let jitter = {
                    let mut rng = rand::rng();
                    rng.random_range(0.75..=1.25)
                };
                std::thread::sleep(base.mul_f64(jitter));

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let devices = devices.read().unwrap();
                for device in devices.values() {
                    for nt in &device.notification_types {
                        send_alive(&socket, device, nt);
                    }
                }
            }
        });
    }

    /// Écoute des M-SEARCH entrants.
    fn start_msearch_listener(&self, socket: Arc<UdpSocket>) {
        let devices = Arc::clone(&self.devices);
        let running = Arc::clone(&self.running);

        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            while running.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf) {
                    Ok((n, src)) => {
                        let data = String::from_utf8_lossy(&buf[..n]);
                        if !data.starts_with("M-SEARCH") {
                            continue;
                        }
                        let Some(st) = parse_header(&data, "ST") else {
                            continue;
                        };
                        let mx = parse_header(&data, "MX")
                            .and_then(|v| v.parse::<u32>().ok())
                            .unwrap_or(super::DEFAULT_SEARCH_MX);

                        let devices = devices.read().unwrap();
                        for device in devices.values() {
                            schedule_msearch_response(&socket, src, &st, mx, device);
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        warn!("❌ SSDP read error: {}", e);
                    }
                }
            }
        });
    }
}

impl Drop for SsdpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_alive(socket: &UdpSocket, device: &SsdpAnnouncement, nt: &str) {
    let usn = device.usn_for(nt);
    let msg = format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, MAX_AGE, device.location, nt, device.server, usn
    );

    let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
        .parse()
        .unwrap();

    match socket.send_to(msg.as_bytes(), addr) {
        Ok(_) => debug!("✅ NOTIFY alive: {} (NT={})", usn, nt),
        Err(e) => warn!("❌ Failed to send NOTIFY alive for {}: {}", usn, e),
    }
}

fn send_byebye(socket: &UdpSocket, device: &SsdpAnnouncement, nt: &str) {
    let usn = device.usn_for(nt);
    let msg = format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, nt, usn
    );

    let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
        .parse()
        .unwrap();

    match socket.send_to(msg.as_bytes(), addr) {
        Ok(_) => info!("👋 NOTIFY byebye: {} (NT={})", usn, nt),
        Err(e) => warn!("❌ Failed to send NOTIFY byebye for {}: {}", usn, e),
    }
}

/// Les NTs d'un device qui répondent à un ST donné.
fn matching_notification_types(device: &SsdpAnnouncement, st: &str) -> Vec<String> {
    if st == "ssdp:all" {
        device.notification_types.clone()
    } else if device.notification_types.iter().any(|nt| nt == st) {
        vec![st.to_string()]
    } else {
        Vec::new()
    }
}

/// Répond à un M-SEARCH après un délai aléatoire dans [0, min(MX, 5)] s,
/// comme l'exige le protocole pour éviter les rafales de réponses.
fn schedule_msearch_response(
    socket: &Arc<UdpSocket>,
    src: SocketAddr,
    st: &str,
    mx: u32,
    device: &SsdpAnnouncement,
) {
    let nts = matching_notification_types(device, st);
    if nts.is_empty() {
        return;
    }

    info!("✅ M-SEARCH matched (ST={}, from={})", st, src);

    let socket = Arc::clone(socket);
    let device = device.clone();
    let delay_ceiling = mx.clamp(1, 5) as f64;

    std::thread::spawn(move || {
        let delay = {
            let mut rng = rand::rng();
            rng.random_range(0.0..delay_ceiling)
        };
        std::thread::sleep(Duration::from_secs_f64(delay));

        for nt in nts {
            let usn = device.usn_for(&nt);
            let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");

            let resp = format!(
                "HTTP/1.1 200 OK\r\n\
                 CACHE-CONTROL: max-age={}\r\n\
                 DATE: {}\r\n\
                 EXT:\r\n\
                 LOCATION: {}\r\n\
                 SERVER: {}\r\n\
                 ST: {}\r\n\
                 USN: {}\r\n\
                 \r\n",
                MAX_AGE, date, device.location, device.server, nt, usn
            );

            match socket.send_to(resp.as_bytes(), src) {
                Ok(_) => debug!("📡 M-SEARCH response sent to {} (ST={})", src, nt),
                Err(e) => warn!("❌ Failed to send M-SEARCH response to {}: {}", src, e),
            }
        }
    });
}

/// Extrait un en-tête d'un datagramme SSDP brut (insensible à la casse).
fn parse_header(data: &str, name: &str) -> Option<String> {
    let prefix = format!("{}:", name.to_ascii_uppercase());
    for line in data.lines() {
        if line.to_ascii_uppercase().starts_with(&prefix) {
            return Some(line[prefix.len()..].trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> SsdpAnnouncement {
        let mut ann = SsdpAnnouncement::new(
            "12345678-1234-1234-1234-123456789abc".to_string(),
            "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            "http://10.0.0.5:8080/description.xml".to_string(),
            "Linux/6.1 UPnP/1.1 AVE/1.0".to_string(),
        );
        ann.add_notification_type("urn:schemas-upnp-org:service:AVTransport:1".to_string());
        ann
    }

    #[test]
    fn announcement_nts() {
        let ann = renderer();
        assert_eq!(ann.notification_types.len(), 4);
        assert_eq!(
            ann.notification_types[0],
            "uuid:12345678-1234-1234-1234-123456789abc"
        );
        assert_eq!(ann.notification_types[1], "upnp:rootdevice");
    }

    #[test]
    fn usn_formatting() {
        let ann = renderer();
        assert_eq!(
            ann.usn_for("uuid:12345678-1234-1234-1234-123456789abc"),
            "uuid:12345678-1234-1234-1234-123456789abc"
        );
        assert_eq!(
            ann.usn_for("upnp:rootdevice"),
            "uuid:12345678-1234-1234-1234-123456789abc::upnp:rootdevice"
        );
    }

    #[test]
    fn msearch_matching() {
        let ann = renderer();
        assert_eq!(matching_notification_types(&ann, "ssdp:all").len(), 4);
        assert_eq!(
            matching_notification_types(&ann, "urn:schemas-upnp-org:service:AVTransport:1"),
            vec!["urn:schemas-upnp-org:service:AVTransport:1".to_string()]
        );
        assert!(matching_notification_types(
            &ann,
            "urn:schemas-upnp-org:device:MediaServer:1"
        )
        .is_empty());
    }

    #[test]
    fn header_extraction() {
        let msg = "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMX: 3\r\nst: ssdp:all\r\n\r\n";
        assert_eq!(parse_header(msg, "ST").as_deref(), Some("ssdp:all"));
        assert_eq!(parse_header(msg, "MX").as_deref(), Some("3"));
        assert_eq!(parse_header(msg, "USN"), None);
    }
}
