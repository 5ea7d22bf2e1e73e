use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;

/// The two comparison targets of every test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLabel {
    Gp,
    Put,
}

impl TargetLabel {
    pub const ALL: [TargetLabel; 2] = [TargetLabel::Gp, TargetLabel::Put];
}

impl fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetLabel::Gp => write!(f, "GP"),
            TargetLabel::Put => write!(f, "PUT"),
        }
    }
}

/// Identity of one target platform. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConfig {
    pub ip: String,
    pub netmask: String,
    pub mac: Option<String>,
    pub port: Option<u16>,
}

/// Where a generator process's output stream goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputSink {
    Inherit,
    Discard,
}

impl OutputSink {
    pub fn to_stdio(self) -> Stdio {
        match self {
            OutputSink::Inherit => Stdio::inherit(),
            OutputSink::Discard => Stdio::null(),
        }
    }
}

/// Full configuration of one stimulus-generator run.
///
/// `exec_time` semantics: 0 means the command is self-terminating and
/// is waited for; a positive value means "run for exactly this many
/// seconds, then terminate". Negative values are rejected during
/// configuration validation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub gen_if: String,
    pub platform: PlatformConfig,
    pub gen_cmd: Vec<String>,
    pub exec_time: i64,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

/// One capture vantage point of a recorder.
///
/// `pcap_path` starts out unset and is filled in by the recorder once
/// the capture has been persisted; the comparator consumes it from
/// here.
#[derive(Debug, Clone)]
pub struct RecInterfaceConfig {
    pub if_name: String,
    pub target: TargetLabel,
    pub wr_path: PathBuf,
    pub filter_expr: Option<String>,
    pub pcap_path: Option<PathBuf>,
}

/// Capture set for one target: one or two interfaces plus the number of
/// seconds to keep capturing after the generator is done.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub rec_ifs: Vec<RecInterfaceConfig>,
    pub pause_before_stop: u64,
}

/// Expected inter-packet delay for one consecutive packet-pair slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingRange {
    pub mu: f64,
    pub sigma: f64,
}

impl From<(f64, f64)> for TimingRange {
    fn from((mu, sigma): (f64, f64)) -> Self {
        Self { mu, sigma }
    }
}

// ---- serde model of the TOML test-setup file ----

#[derive(Debug, Clone, Deserialize)]
pub struct TestSetup {
    pub golden_platform: PlatformSection,
    pub platform_under_test: PlatformSection,
    pub dump: DumpSection,
    pub generators: GeneratorSection,
    pub recorders: RecorderSection,
    #[serde(default)]
    pub cases: CaseSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    pub ip: String,
    pub netmask: String,
    pub mac: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DumpSection {
    pub base_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_silence")]
    pub silence: bool,
    pub gp_interface: String,
    pub put_interface: String,
}

fn default_silence() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderSection {
    pub gp: InterfaceSet,
    pub put: InterfaceSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSet {
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseSection {
    pub icmp0: Option<CaseConfig>,
    pub tlshs: Option<CaseConfig>,
}

/// Per-test-case tunables: the generator command template, its exec
/// timeout, the capture filter, the trailing-capture pause and optional
/// expected inter-packet timing ranges per target.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    pub prefix: String,
    pub cmd: String,
    pub timeout: i64,
    pub pause_before_stop: u64,
    pub filter_expr: String,
    pub time_rngs_gp: Option<Vec<(f64, f64)>>,
    pub time_rngs_put: Option<Vec<(f64, f64)>>,
}

impl CaseConfig {
    pub fn timing_gp(&self) -> Option<Vec<TimingRange>> {
        self.time_rngs_gp
            .as_ref()
            .map(|v| v.iter().map(|&t| TimingRange::from(t)).collect())
    }

    pub fn timing_put(&self) -> Option<Vec<TimingRange>> {
        self.time_rngs_put
            .as_ref()
            .map(|v| v.iter().map(|&t| TimingRange::from(t)).collect())
    }
}
