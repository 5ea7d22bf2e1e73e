//! Live capture sessions.
//!
//! The recorder talks to capture engines only through the
//! [`CaptureSession`]/[`SessionFactory`] traits so tests can inject
//! scripted sessions. The shipped implementation reads raw frames from a
//! `pnet` datalink channel on a dedicated thread per interface.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, warn};
use pnet::datalink::{self, Channel, Config};

use crate::error_handling::types::CaptureError;

use super::decode::decode_frame;
use super::types::{FieldValue, LayerKind, Packet};

/// One interface-bound packet-sniffing session.
///
/// `start` begins capturing in the background; `stop` blocks until the
/// capture thread has fully joined and yields the stored packets.
pub trait CaptureSession: Send {
    fn if_name(&self) -> &str;
    fn filter_expr(&self) -> Option<&str>;
    fn start(&mut self) -> Result<(), CaptureError>;
    fn stop(self: Box<Self>) -> Result<Vec<Packet>, CaptureError>;
}

/// Opens capture sessions for the recorder.
pub trait SessionFactory: Send + Sync {
    fn open(
        &self,
        if_name: &str,
        filter_expr: Option<&str>,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// Factory producing [`DatalinkSession`]s.
pub struct DatalinkSessionFactory;

impl SessionFactory for DatalinkSessionFactory {
    fn open(
        &self,
        if_name: &str,
        filter_expr: Option<&str>,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        Ok(Box::new(DatalinkSession::new(if_name, filter_expr)))
    }
}

/// Promiscuous capture on one interface via a `pnet` datalink channel.
///
/// The reader thread polls with a short read timeout so the stop flag is
/// observed promptly; captured frames are decoded and filtered on the
/// capture thread and stored in memory until `stop` collects them.
pub struct DatalinkSession {
    if_name: String,
    filter: Option<String>,
    stop_flag: Arc<AtomicBool>,
    packets: Arc<Mutex<Vec<Packet>>>,
    worker: Option<JoinHandle<()>>,
}

impl DatalinkSession {
    pub fn new(if_name: &str, filter_expr: Option<&str>) -> Self {
        Self {
            if_name: if_name.to_string(),
            filter: filter_expr.map(str::to_string),
            stop_flag: Arc::new(AtomicBool::new(false)),
            packets: Arc::new(Mutex::new(Vec::new())),
            worker: None,
        }
    }
}

impl CaptureSession for DatalinkSession {
    fn if_name(&self) -> &str {
        &self.if_name
    }

    fn filter_expr(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == self.if_name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(self.if_name.clone()))?;

        let config = Config {
            read_timeout: Some(Duration::from_millis(200)),
            promiscuous: true,
            ..Config::default()
        };
        let mut rx = match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::ChannelFailed(format!(
                    "unexpected channel type on {}",
                    self.if_name
                )))
            }
            Err(e) => return Err(CaptureError::ChannelFailed(e.to_string())),
        };

        let stop_flag = Arc::clone(&self.stop_flag);
        let packets = Arc::clone(&self.packets);
        let filter = self.filter.clone();
        let if_name = self.if_name.clone();

        self.worker = Some(std::thread::spawn(move || {
            debug!("Capture thread on {} running", if_name);
            while !stop_flag.load(Ordering::Relaxed) {
                match rx.next() {
                    Ok(frame) => {
                        let ts = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_secs_f64();
                        let pkt = decode_frame(ts, frame);
                        let keep = filter
                            .as_deref()
                            .map(|expr| filter_matches(expr, &pkt))
                            .unwrap_or(true);
                        if keep {
                            if let Ok(mut stored) = packets.lock() {
                                stored.push(pkt);
                            }
                        }
                    }
                    Err(e)
                        if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Capture read error on {}: {}", if_name, e);
                        break;
                    }
                }
            }
            debug!("Capture thread on {} exiting", if_name);
        }));
        Ok(())
    }

    fn stop(mut self: Box<Self>) -> Result<Vec<Packet>, CaptureError> {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| CaptureError::SessionFailed("capture thread panicked".to_string()))?;
        }
        let packets = self
            .packets
            .lock()
            .map_err(|_| CaptureError::SessionFailed("capture store poisoned".to_string()))?
            .drain(..)
            .collect();
        Ok(packets)
    }
}

/// Evaluates the supported capture-filter subset against a decoded
/// packet: a protocol keyword (`icmp`, `tcp`, `udp`, `ip`), `host <ip>`
/// and `port <n>`, conjoined by whitespace (an optional `and` token is
/// accepted). Unknown tokens are warned about and skipped so that an
/// over-specified expression widens the capture instead of emptying it.
pub fn filter_matches(expr: &str, pkt: &Packet) -> bool {
    let mut tokens = expr.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let ok = match token {
            "and" => true,
            "icmp" => pkt.has_layer(LayerKind::Icmpv4),
            "tcp" => pkt.has_layer(LayerKind::Tcp),
            "udp" => pkt.has_layer(LayerKind::Udp),
            "ip" => pkt.has_layer(LayerKind::Ipv4) || pkt.has_layer(LayerKind::Ipv6),
            "host" => match tokens.next() {
                Some(addr) => {
                    let want = FieldValue::Text(addr.to_string());
                    [LayerKind::Ipv4, LayerKind::Ipv6]
                        .iter()
                        .filter_map(|k| pkt.layer(*k))
                        .any(|l| l.field("src") == Some(&want) || l.field("dst") == Some(&want))
                }
                None => {
                    warn!("Filter expression ends after 'host', token skipped");
                    true
                }
            },
            "port" => match tokens.next().and_then(|p| p.parse::<u64>().ok()) {
                Some(port) => {
                    let want = FieldValue::Uint(port);
                    [LayerKind::Tcp, LayerKind::Udp]
                        .iter()
                        .filter_map(|k| pkt.layer(*k))
                        .any(|l| l.field("sport") == Some(&want) || l.field("dport") == Some(&want))
                }
                None => {
                    warn!("Filter expression has no numeric port, token skipped");
                    true
                }
            },
            other => {
                warn!("Unsupported filter token '{}', skipped", other);
                true
            }
        };
        if !ok {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_model::types::Layer;

    fn icmp_packet() -> Packet {
        let ip = Layer::new(LayerKind::Ipv4)
            .with("src", FieldValue::Text("10.0.0.1".to_string()))
            .with("dst", FieldValue::Text("10.0.0.2".to_string()));
        let icmp = Layer::new(LayerKind::Icmpv4).with("type", FieldValue::Uint(8));
        Packet::new(0.0, vec![ip, icmp], vec![])
    }

    fn tcp_packet(dport: u64) -> Packet {
        let ip = Layer::new(LayerKind::Ipv4)
            .with("src", FieldValue::Text("10.0.0.1".to_string()))
            .with("dst", FieldValue::Text("10.0.0.9".to_string()));
        let tcp = Layer::new(LayerKind::Tcp)
            .with("sport", FieldValue::Uint(51000))
            .with("dport", FieldValue::Uint(dport));
        Packet::new(0.0, vec![ip, tcp], vec![])
    }

    #[test]
    fn protocol_keyword_filters() {
        assert!(filter_matches("icmp", &icmp_packet()));
        assert!(!filter_matches("tcp", &icmp_packet()));
        assert!(filter_matches("ip", &tcp_packet(80)));
    }

    #[test]
    fn host_and_port_filters() {
        assert!(filter_matches("host 10.0.0.1", &icmp_packet()));
        assert!(!filter_matches("host 192.168.1.1", &icmp_packet()));
        assert!(filter_matches("tcp and port 443", &tcp_packet(443)));
        assert!(!filter_matches("tcp and port 443", &tcp_packet(80)));
    }

    #[test]
    fn unknown_tokens_do_not_exclude() {
        assert!(filter_matches("vlan icmp", &icmp_packet()));
    }

    #[test]
    fn unknown_interface_fails_to_start() {
        let mut session = DatalinkSession::new("netdiff-does-not-exist0", None);
        assert!(matches!(
            session.start(),
            Err(CaptureError::InterfaceNotFound(_))
        ));
    }
}
