//! ICMP echo test case.
//!
//! Compares the IP version plus the ICMP type, code and sequence number
//! of every packet pair, so a platform answering echo requests with the
//! wrong code or a shuffled sequence shows up immediately.

use std::path::Path;
use std::sync::Arc;

use crate::comparator::types::{ComparatorEntry, FieldGetter};
use crate::configuration::types::TestSetup;
use crate::error_handling::types::ConfigError;
use crate::packet_model::live::SessionFactory;
use crate::packet_model::types::{FieldValue, Layer, LayerKind};

use super::test_case::{assemble_case, TestCase};

fn ip_version(layer: &Layer) -> Option<FieldValue> {
    layer.field("version").cloned()
}

fn icmp_type(layer: &Layer) -> Option<FieldValue> {
    layer.field("type").cloned()
}

fn icmp_code(layer: &Layer) -> Option<FieldValue> {
    layer.field("code").cloned()
}

fn icmp_seq(layer: &Layer) -> Option<FieldValue> {
    layer.field("seq").cloned()
}

pub fn cmp_entries() -> Vec<ComparatorEntry> {
    vec![
        ComparatorEntry::new(
            LayerKind::Ipv4,
            vec![FieldGetter {
                name: "version",
                get: ip_version,
            }],
        ),
        ComparatorEntry::new(
            LayerKind::Icmpv4,
            vec![
                FieldGetter {
                    name: "type",
                    get: icmp_type,
                },
                FieldGetter {
                    name: "code",
                    get: icmp_code,
                },
                FieldGetter {
                    name: "seq",
                    get: icmp_seq,
                },
            ],
        ),
    ]
}

/// Builds the ICMP echo test case, or `None` when the setup file does
/// not configure it.
pub fn build(
    setup: &TestSetup,
    dump_root: &Path,
    factory: Arc<dyn SessionFactory>,
) -> Result<Option<TestCase>, ConfigError> {
    let case = match &setup.cases.icmp0 {
        Some(case) => case,
        None => return Ok(None),
    };
    assemble_case(setup, case, dump_root, factory, cmp_entries()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_cover_ip_and_icmp() {
        let entries = cmp_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].layer, LayerKind::Ipv4);
        assert_eq!(entries[1].layer, LayerKind::Icmpv4);
        assert_eq!(entries[1].field_getters.len(), 3);
        assert!(entries.iter().all(|e| e.cmp_fn.is_none()));
    }

    #[test]
    fn getters_read_the_decoded_fields() {
        let layer = Layer::new(LayerKind::Icmpv4)
            .with("type", FieldValue::Uint(0))
            .with("code", FieldValue::Uint(0))
            .with("seq", FieldValue::Uint(42));
        assert_eq!(icmp_seq(&layer), Some(FieldValue::Uint(42)));
        assert_eq!(icmp_type(&layer), Some(FieldValue::Uint(0)));
        assert_eq!(ip_version(&layer), None);
    }
}
