use std::collections::BTreeMap;
use std::fmt;

/// Protocol layers the comparator can address within a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    Ethernet,
    Ipv4,
    Ipv6,
    Icmpv4,
    Tcp,
    Udp,
    TlsClientHello,
    TlsServerHello,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Ethernet => "Ethernet",
            LayerKind::Ipv4 => "IPv4",
            LayerKind::Ipv6 => "IPv6",
            LayerKind::Icmpv4 => "ICMP",
            LayerKind::Tcp => "TCP",
            LayerKind::Udp => "UDP",
            LayerKind::TlsClientHello => "TLS ClientHello",
            LayerKind::TlsServerHello => "TLS ServerHello",
        };
        write!(f, "{}", name)
    }
}

/// A scalar (or scalar list) value extracted from a protocol layer field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uint(u64),
    UintList(Vec<u64>),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::UintList(vs) => write!(f, "{:?}", vs),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Bytes(b) => write!(f, "{:02x?}", b),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

/// One decoded protocol layer: a kind plus its named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    fields: BTreeMap<&'static str, FieldValue>,
}

impl Layer {
    pub fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn set(&mut self, name: &'static str, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn with(mut self, name: &'static str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A decoded packet: wall-clock capture timestamp (seconds since the
/// epoch), the decoded layer stack, and the raw frame bytes it was
/// decoded from (kept so captures can be re-persisted losslessly).
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub timestamp: f64,
    pub layers: Vec<Layer>,
    pub raw: Vec<u8>,
}

impl Packet {
    pub fn new(timestamp: f64, layers: Vec<Layer>, raw: Vec<u8>) -> Self {
        Self {
            timestamp,
            layers,
            raw,
        }
    }

    /// Presence test for a protocol layer within this packet.
    pub fn has_layer(&self, kind: LayerKind) -> bool {
        self.layers.iter().any(|l| l.kind() == kind)
    }

    /// First layer of the given kind, if present.
    pub fn layer(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.iter().find(|l| l.kind() == kind)
    }
}
