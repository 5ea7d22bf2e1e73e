use std::path::PathBuf;

use crate::configuration::types::TimingRange;
use crate::packet_model::types::{FieldValue, Layer, LayerKind};

use super::report::ReportSink;

/// Extracts one scalar field out of a protocol layer. The name is only
/// used for report output when extraction fails.
#[derive(Clone, Copy)]
pub struct FieldGetter {
    pub name: &'static str,
    pub get: fn(&Layer) -> Option<FieldValue>,
}

/// Per-field comparison hook; the default (strict equality with
/// expected/actual logging) is used when an entry carries none.
pub type FieldCmpFn = fn(&mut ReportSink, usize, &FieldValue, &FieldValue) -> bool;

/// One comparison rule: which protocol layer to look at, which of its
/// fields to extract, and optionally how to compare them.
#[derive(Clone)]
pub struct ComparatorEntry {
    pub layer: LayerKind,
    pub field_getters: Vec<FieldGetter>,
    pub cmp_fn: Option<FieldCmpFn>,
}

impl ComparatorEntry {
    pub fn new(layer: LayerKind, field_getters: Vec<FieldGetter>) -> Self {
        Self {
            layer,
            field_getters,
            cmp_fn: None,
        }
    }

    pub fn with_cmp_fn(mut self, cmp_fn: FieldCmpFn) -> Self {
        self.cmp_fn = Some(cmp_fn);
        self
    }
}

/// Sealed comparison configuration for one test case: the pcap pairs to
/// compare (expected = GP, actual = PUT), the parallel report
/// directories, the comparison entries and the optional expected
/// inter-packet timing ranges per target.
#[derive(Clone, Default)]
pub struct CmpConfig {
    pub pcap_pairs: Vec<(PathBuf, PathBuf)>,
    pub rpt_dirs: Vec<PathBuf>,
    pub entries: Vec<ComparatorEntry>,
    pub times_gp: Option<Vec<TimingRange>>,
    pub times_put: Option<Vec<TimingRange>>,
}
