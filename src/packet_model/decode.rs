//! Raw frame decoding into the layered [`Packet`] model.
//!
//! Ethernet/IP/transport parsing is delegated to `etherparse`; on top of
//! that a small bounds-checked extractor pulls the cipher fields out of
//! TLS ClientHello/ServerHello handshake records, which is all the TLS
//! comparison entries ever read.

use etherparse::{IpHeader, PacketHeaders, TransportHeader};
use log::debug;

use super::types::{FieldValue, Layer, LayerKind, Packet};

/// Decodes one captured frame. Undecodable frames yield a packet with an
/// empty layer stack; the raw bytes and timestamp are kept either way so
/// the capture can still be persisted and counted.
pub fn decode_frame(timestamp: f64, frame: &[u8]) -> Packet {
    let mut layers = Vec::new();

    match PacketHeaders::from_ethernet_slice(frame) {
        Ok(headers) => {
            if let Some(eth) = &headers.link {
                layers.push(
                    Layer::new(LayerKind::Ethernet)
                        .with("src", FieldValue::Text(mac_str(&eth.source)))
                        .with("dst", FieldValue::Text(mac_str(&eth.destination)))
                        .with("ethertype", FieldValue::Uint(eth.ether_type as u64)),
                );
            }
            match &headers.ip {
                Some(IpHeader::Version4(ip, _ext)) => {
                    layers.push(
                        Layer::new(LayerKind::Ipv4)
                            .with("version", FieldValue::Uint(4))
                            .with("id", FieldValue::Uint(ip.identification as u64))
                            .with("ttl", FieldValue::Uint(ip.time_to_live as u64))
                            .with("proto", FieldValue::Uint(ip.protocol as u64))
                            .with(
                                "src",
                                FieldValue::Text(std::net::Ipv4Addr::from(ip.source).to_string()),
                            )
                            .with(
                                "dst",
                                FieldValue::Text(
                                    std::net::Ipv4Addr::from(ip.destination).to_string(),
                                ),
                            ),
                    );
                }
                Some(IpHeader::Version6(ip, _ext)) => {
                    layers.push(
                        Layer::new(LayerKind::Ipv6)
                            .with("version", FieldValue::Uint(6))
                            .with("hop_limit", FieldValue::Uint(ip.hop_limit as u64))
                            .with("next_header", FieldValue::Uint(ip.next_header as u64))
                            .with(
                                "src",
                                FieldValue::Text(std::net::Ipv6Addr::from(ip.source).to_string()),
                            )
                            .with(
                                "dst",
                                FieldValue::Text(
                                    std::net::Ipv6Addr::from(ip.destination).to_string(),
                                ),
                            ),
                    );
                }
                None => {}
            }
            match &headers.transport {
                Some(TransportHeader::Icmpv4(icmp)) => {
                    let (type_u8, code_u8) = icmp_type_code(&icmp.icmp_type);
                    let mut layer = Layer::new(LayerKind::Icmpv4)
                        .with("type", FieldValue::Uint(type_u8 as u64))
                        .with("code", FieldValue::Uint(code_u8 as u64));
                    if let etherparse::Icmpv4Type::EchoRequest(echo)
                    | etherparse::Icmpv4Type::EchoReply(echo) = &icmp.icmp_type
                    {
                        layer.set("ident", FieldValue::Uint(echo.id as u64));
                        layer.set("seq", FieldValue::Uint(echo.seq as u64));
                    }
                    layers.push(layer);
                }
                Some(TransportHeader::Tcp(tcp)) => {
                    layers.push(
                        Layer::new(LayerKind::Tcp)
                            .with("sport", FieldValue::Uint(tcp.source_port as u64))
                            .with("dport", FieldValue::Uint(tcp.destination_port as u64))
                            .with("seq", FieldValue::Uint(tcp.sequence_number as u64))
                            .with("ack", FieldValue::Uint(tcp.acknowledgment_number as u64))
                            .with("flags", FieldValue::Uint(tcp_flags(tcp) as u64)),
                    );
                    layers.extend(tls_hello_layers(headers.payload));
                }
                Some(TransportHeader::Udp(udp)) => {
                    layers.push(
                        Layer::new(LayerKind::Udp)
                            .with("sport", FieldValue::Uint(udp.source_port as u64))
                            .with("dport", FieldValue::Uint(udp.destination_port as u64))
                            .with("len", FieldValue::Uint(udp.length as u64)),
                    );
                }
                _ => {}
            }
        }
        Err(e) => {
            debug!("Frame could not be decoded: {:?}", e);
        }
    }

    Packet::new(timestamp, layers, frame.to_vec())
}

/// Recovers the on-wire type/code bytes from a parsed ICMPv4 message.
/// The known message variants drop the raw bytes during parsing, so
/// they are mapped back per RFC 792.
fn icmp_type_code(icmp_type: &etherparse::Icmpv4Type) -> (u8, u8) {
    use etherparse::icmpv4::*;
    use etherparse::Icmpv4Type;
    match icmp_type {
        Icmpv4Type::Unknown {
            type_u8, code_u8, ..
        } => (*type_u8, *code_u8),
        Icmpv4Type::EchoReply(_) => (TYPE_ECHO_REPLY, 0),
        Icmpv4Type::DestinationUnreachable(header) => (TYPE_DEST_UNREACH, header.code_u8()),
        Icmpv4Type::Redirect(header) => (TYPE_REDIRECT, header.code.code_u8()),
        Icmpv4Type::EchoRequest(_) => (TYPE_ECHO_REQUEST, 0),
        Icmpv4Type::TimeExceeded(code) => (TYPE_TIME_EXCEEDED, code.code_u8()),
        Icmpv4Type::ParameterProblem(header) => {
            let code = match header {
                ParameterProblemHeader::PointerIndicatesError(_) => {
                    CODE_PARAMETER_PROBLEM_POINTER_INDICATES_ERROR
                }
                ParameterProblemHeader::MissingRequiredOption => {
                    CODE_PARAMETER_PROBLEM_MISSING_REQUIRED_OPTION
                }
                ParameterProblemHeader::BadLength => CODE_PARAMETER_PROBLEM_BAD_LENGTH,
            };
            (TYPE_PARAMETER_PROBLEM, code)
        }
        Icmpv4Type::TimestampRequest(_) => (TYPE_TIMESTAMP, 0),
        Icmpv4Type::TimestampReply(_) => (TYPE_TIMESTAMP_REPLY, 0),
    }
}

fn mac_str(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

fn tcp_flags(tcp: &etherparse::TcpHeader) -> u8 {
    (tcp.fin as u8)
        | (tcp.syn as u8) << 1
        | (tcp.rst as u8) << 2
        | (tcp.psh as u8) << 3
        | (tcp.ack as u8) << 4
        | (tcp.urg as u8) << 5
}

/// Extracts TLS ClientHello / ServerHello layers from a TCP payload.
///
/// Walks TLS records of handshake type (content type 22, version major
/// 3) and decodes the cipher-relevant fields of any hello messages
/// found. Anything malformed or truncated simply yields no layer.
fn tls_hello_layers(payload: &[u8]) -> Vec<Layer> {
    let mut layers = Vec::new();
    let mut off = 0usize;

    while off + 5 <= payload.len() {
        let content_type = payload[off];
        let version_major = payload[off + 1];
        let record_len = u16::from_be_bytes([payload[off + 3], payload[off + 4]]) as usize;
        let body_start = off + 5;
        let body_end = body_start + record_len;
        if content_type != 22 || version_major != 3 || body_end > payload.len() {
            break;
        }
        let mut hs_off = body_start;
        while hs_off + 4 <= body_end {
            let hs_type = payload[hs_off];
            let hs_len = u32::from_be_bytes([
                0,
                payload[hs_off + 1],
                payload[hs_off + 2],
                payload[hs_off + 3],
            ]) as usize;
            let hs_body = &payload[hs_off + 4..];
            let hs_body = match hs_body.get(..hs_len.min(hs_body.len())) {
                Some(b) if b.len() == hs_len => b,
                _ => break,
            };
            match hs_type {
                1 => {
                    if let Some(layer) = parse_client_hello(hs_body) {
                        layers.push(layer);
                    }
                }
                2 => {
                    if let Some(layer) = parse_server_hello(hs_body) {
                        layers.push(layer);
                    }
                }
                _ => {}
            }
            hs_off += 4 + hs_len;
        }
        off = body_end;
    }

    layers
}

fn parse_client_hello(body: &[u8]) -> Option<Layer> {
    let version = u16::from_be_bytes([*body.first()?, *body.get(1)?]);
    // 2 bytes version + 32 bytes random
    let sid_len = *body.get(34)? as usize;
    let cs_off = 35 + sid_len;
    let cs_len = u16::from_be_bytes([*body.get(cs_off)?, *body.get(cs_off + 1)?]) as usize;
    let cs_bytes = body.get(cs_off + 2..cs_off + 2 + cs_len)?;
    let ciphers = cs_bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]) as u64)
        .collect();
    Some(
        Layer::new(LayerKind::TlsClientHello)
            .with("version", FieldValue::Uint(version as u64))
            .with("ciphers", FieldValue::UintList(ciphers)),
    )
}

fn parse_server_hello(body: &[u8]) -> Option<Layer> {
    let version = u16::from_be_bytes([*body.first()?, *body.get(1)?]);
    let sid_len = *body.get(34)? as usize;
    let cipher_off = 35 + sid_len;
    let cipher = u16::from_be_bytes([*body.get(cipher_off)?, *body.get(cipher_off + 1)?]);
    Some(
        Layer::new(LayerKind::TlsServerHello)
            .with("version", FieldValue::Uint(version as u64))
            .with("cipher", FieldValue::Uint(cipher as u64)),
    )
}
