//! TLS handshake test case.
//!
//! Compares the offered cipher-suite list of every ClientHello and the
//! cipher the server selects in its ServerHello. Divergent cipher
//! negotiation between the two platforms is the whole point of this
//! case; record-layer details are left alone.

use std::path::Path;
use std::sync::Arc;

use crate::comparator::types::{ComparatorEntry, FieldGetter};
use crate::configuration::types::TestSetup;
use crate::error_handling::types::ConfigError;
use crate::packet_model::live::SessionFactory;
use crate::packet_model::types::{FieldValue, Layer, LayerKind};

use super::test_case::{assemble_case, TestCase};

fn client_ciphers(layer: &Layer) -> Option<FieldValue> {
    layer.field("ciphers").cloned()
}

fn server_cipher(layer: &Layer) -> Option<FieldValue> {
    layer.field("cipher").cloned()
}

pub fn cmp_entries() -> Vec<ComparatorEntry> {
    vec![
        ComparatorEntry::new(
            LayerKind::TlsClientHello,
            vec![FieldGetter {
                name: "ciphers",
                get: client_ciphers,
            }],
        ),
        ComparatorEntry::new(
            LayerKind::TlsServerHello,
            vec![FieldGetter {
                name: "cipher",
                get: server_cipher,
            }],
        ),
    ]
}

/// Builds the TLS handshake test case, or `None` when the setup file
/// does not configure it.
pub fn build(
    setup: &TestSetup,
    dump_root: &Path,
    factory: Arc<dyn SessionFactory>,
) -> Result<Option<TestCase>, ConfigError> {
    let case = match &setup.cases.tlshs {
        Some(case) => case,
        None => return Ok(None),
    };
    assemble_case(setup, case, dump_root, factory, cmp_entries()).map(Some)
}
