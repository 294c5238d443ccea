//! Client SSDP : émission des M-SEARCH et écoute des annonces.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use super::{DEFAULT_SEARCH_MX, MULTICAST_TTL, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Événements SSDP vus par un control point.
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        /// Valeur du CACHE-CONTROL max-age ; `None` si l'annonce n'en
        /// portait pas (elle sera ignorée par le cache de découverte).
        max_age: Option<u32>,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: Option<u32>,
        from: SocketAddr,
    },
}

/// Socket SSDP côté control point (port éphémère, jamais 1900).
///
/// Clonable : les clones partagent le même socket.
#[derive(Clone)]
pub struct SsdpClient {
    socket: Arc<UdpSocket>,
}

impl SsdpClient {
    /// Crée le socket, le lie à un port éphémère et rejoint le groupe
    /// multicast sur les interfaces IPv4 disponibles.
    ///
    /// `interface_name` restreint l'adhésion multicast à une interface.
    pub fn new(interface_name: Option<&str>) -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_loop_v4(true)?; // utile en dev local
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;

        let group = SSDP_MULTICAST_ADDR.parse().unwrap();
        for iface in get_if_addrs::get_if_addrs()? {
            if let Some(wanted) = interface_name {
                if iface.name != wanted {
                    continue;
                }
            }
            let std::net::IpAddr::V4(ipv4) = iface.ip() else {
                continue;
            };
            if ipv4.is_loopback() && interface_name.is_none() {
                continue;
            }
            match socket.join_multicast_v4(&group, &ipv4) {
                Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                Err(e) => warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e),
            }
        }

        info!("✅ SSDP client ready");

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Envoie un M-SEARCH pour un ST donné (`ssdp:all` ou un URN).
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.clamp(1, 5);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: AVE UPnP/1.1\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
        );

        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .unwrap();

        match self.socket.send_to(msg.as_bytes(), addr) {
            Ok(_) => {
                info!("📤 M-SEARCH sent (ST={}, MX={})", st, mx);
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Idem avec le MX par défaut.
    pub fn send_msearch_default(&self, st: &str) -> std::io::Result<()> {
        self.send_msearch(st, DEFAULT_SEARCH_MX)
    }

    /// Boucle de réception bloquante ; chaque datagramme décodable produit
    /// un [`SsdpEvent`]. Un datagramme malformé est ignoré, jamais fatal.
    pub fn run_event_loop<F>(&self, mut on_event: F) -> !
    where
        F: FnMut(SsdpEvent) + Send + 'static,
    {
        let socket = Arc::clone(&self.socket);
        let mut buf = [0u8; 8192];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    if let Some(event) = parse_message(&data, from) {
                        trace!("📥 SSDP event from {}: {:?}", from, event);
                        on_event(event);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => {
                    warn!("❌ SSDP client read error: {}", e);
                }
            }
        }
    }
}

/// Décode un datagramme SSDP (NOTIFY, réponse 200, ou M-SEARCH ignoré).
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else if upper.starts_with("M-SEARCH ") {
        // Un autre control point interroge le réseau ; rien à faire ici.
        None
    } else {
        trace!("Unknown SSDP message from {}: {}", from, first_line);
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    if nts == "ssdp:alive" {
        let location = match headers.get("LOCATION") {
            Some(loc) => loc.to_string(),
            None => {
                trace!("NOTIFY alive from {} without LOCATION, ignoring", from);
                return None;
            }
        };

        Some(SsdpEvent::Alive {
            usn,
            nt,
            location,
            server: server_header(headers),
            max_age: parse_max_age(headers.get("CACHE-CONTROL")),
            from,
        })
    } else if nts == "ssdp:byebye" {
        Some(SsdpEvent::ByeBye { usn, nt, from })
    } else {
        trace!("Unknown NTS value from {}: {}", from, nts);
        None
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    let st = headers.get("ST")?.to_string();
    let usn = headers.get("USN")?.to_string();
    let location = headers.get("LOCATION")?.to_string();

    Some(SsdpEvent::SearchResponse {
        usn,
        st,
        location,
        server: server_header(headers),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        from,
    })
}

fn server_header(headers: &HashMap<String, String>) -> String {
    headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        // Couper au premier ':' seulement, les valeurs en contiennent
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();
            if !name.is_empty() {
                headers.insert(name, value);
            }
        } else {
            trace!("Skipping line without colon: '{}'", line);
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> Option<u32> {
    let v = value?;
    let lower = v.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after_key = &v[idx + 7..];
    let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
    let digits: String = after_eq
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_addr() -> SocketAddr {
        "10.0.0.5:1900".parse().unwrap()
    }

    #[test]
    fn parse_alive() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   HOST: 239.255.255.250:1900\r\n\
                   CACHE-CONTROL: max-age=1800\r\n\
                   LOCATION: http://10.0.0.5/desc.xml\r\n\
                   NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   NTS: ssdp:alive\r\n\
                   SERVER: Linux/6.1 UPnP/1.1 AVE/1.0\r\n\
                   USN: uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   \r\n";

        match parse_message(msg, from_addr()) {
            Some(SsdpEvent::Alive {
                usn,
                location,
                max_age,
                ..
            }) => {
                assert_eq!(usn, "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1");
                assert_eq!(location, "http://10.0.0.5/desc.xml");
                assert_eq!(max_age, Some(1800));
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn alive_without_cache_control_has_no_max_age() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   HOST: 239.255.255.250:1900\r\n\
                   LOCATION: http://10.0.0.5/desc.xml\r\n\
                   NT: upnp:rootdevice\r\n\
                   NTS: ssdp:alive\r\n\
                   USN: uuid:abc::upnp:rootdevice\r\n\
                   \r\n";

        match parse_message(msg, from_addr()) {
            Some(SsdpEvent::Alive { max_age, .. }) => assert_eq!(max_age, None),
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn parse_byebye() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   HOST: 239.255.255.250:1900\r\n\
                   NT: upnp:rootdevice\r\n\
                   NTS: ssdp:byebye\r\n\
                   USN: uuid:abc::upnp:rootdevice\r\n\
                   \r\n";

        assert!(matches!(
            parse_message(msg, from_addr()),
            Some(SsdpEvent::ByeBye { .. })
        ));
    }

    #[test]
    fn parse_search_response_headers_case_insensitive() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   Cache-Control: max-age=100\r\n\
                   Location: http://10.0.0.5/desc.xml\r\n\
                   St: urn:schemas-upnp-org:device:MediaServer:1\r\n\
                   Usn: uuid:abc::urn:schemas-upnp-org:device:MediaServer:1\r\n\
                   Ext:\r\n\
                   \r\n";

        match parse_message(msg, from_addr()) {
            Some(SsdpEvent::SearchResponse { st, max_age, .. }) => {
                assert_eq!(st, "urn:schemas-upnp-org:device:MediaServer:1");
                assert_eq!(max_age, Some(100));
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn msearch_is_ignored() {
        let msg = "M-SEARCH * HTTP/1.1\r\n\
                   HOST: 239.255.255.250:1900\r\n\
                   MAN: \"ssdp:discover\"\r\n\
                   MX: 2\r\n\
                   ST: ssdp:all\r\n\
                   \r\n";
        assert!(parse_message(msg, from_addr()).is_none());
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(parse_message("totally not http", from_addr()).is_none());
        assert!(parse_message("", from_addr()).is_none());
    }
}
