//! Capture comparison engine.
//!
//! After both targets ran, the comparator pairs up the GP capture
//! (expected) with the PUT capture (actual) per vantage interface,
//! walks the packet lists in lockstep and checks the configured
//! protocol fields plus the expected inter-packet timing. Each pair
//! gets its own report file and a pass/fail verdict.

use log::info;

use crate::configuration::types::{TargetLabel, TimingRange};
use crate::dispatch::ServiceBundle;
use crate::error_handling::types::ComparatorError;
use crate::packet_model::pcap_io::read_pcap;
use crate::packet_model::types::{FieldValue, Packet};
use crate::recorder::Recorder;

use super::report::ReportSink;
use super::types::{CmpConfig, ComparatorEntry};

/// Timing windows span mu +/- 3 sigma, clamped at zero on the left.
const SIGMA_TIMES: f64 = 3.0;

pub struct Comparator {
    entries: Vec<ComparatorEntry>,
    times_gp: Option<Vec<TimingRange>>,
    times_put: Option<Vec<TimingRange>>,
    cfg: Option<CmpConfig>,
    rptlog: Option<ReportSink>,
}

impl Comparator {
    pub fn new(
        entries: Vec<ComparatorEntry>,
        times_gp: Option<Vec<TimingRange>>,
        times_put: Option<Vec<TimingRange>>,
    ) -> Self {
        Self {
            entries,
            times_gp,
            times_put,
            cfg: None,
            rptlog: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.cfg.is_some()
    }

    /// Derives the comparison configuration from the recorder bundle.
    /// Captures are paired per interface index, GP as expected and PUT
    /// as actual, looked up by label rather than registration order.
    /// Each report lands next to the expected capture.
    pub fn setup(&mut self, recorders: &ServiceBundle<Recorder>) -> Result<(), ComparatorError> {
        if recorders.len() != 2 {
            return Err(ComparatorError::WrongSubServiceCount(recorders.len()));
        }
        let gp = recorders
            .get(TargetLabel::Gp)
            .map_err(|_| ComparatorError::WrongSubServiceCount(recorders.len()))?;
        let put = recorders
            .get(TargetLabel::Put)
            .map_err(|_| ComparatorError::WrongSubServiceCount(recorders.len()))?;

        let gp_ifs = &gp.cfg().rec_ifs;
        let put_ifs = &put.cfg().rec_ifs;
        if gp_ifs.len() != put_ifs.len() {
            return Err(ComparatorError::InterfaceCountMismatch(
                gp_ifs.len(),
                put_ifs.len(),
            ));
        }

        let mut pcap_pairs = Vec::with_capacity(gp_ifs.len());
        let mut rpt_dirs = Vec::with_capacity(gp_ifs.len());
        for (gp_if, put_if) in gp_ifs.iter().zip(put_ifs.iter()) {
            let expected = gp_if
                .pcap_path
                .clone()
                .ok_or_else(|| ComparatorError::MissingPcapPath(gp_if.if_name.clone()))?;
            let actual = put_if
                .pcap_path
                .clone()
                .ok_or_else(|| ComparatorError::MissingPcapPath(put_if.if_name.clone()))?;
            let rpt_dir = expected
                .parent()
                .ok_or_else(|| ComparatorError::MissingPcapPath(gp_if.if_name.clone()))?
                .to_path_buf();
            pcap_pairs.push((expected, actual));
            rpt_dirs.push(rpt_dir);
        }

        self.cfg = Some(CmpConfig {
            pcap_pairs,
            rpt_dirs,
            entries: self.entries.clone(),
            times_gp: self.times_gp.clone(),
            times_put: self.times_put.clone(),
        });
        Ok(())
    }

    /// Runs the comparison for every pcap pair. An empty or unreadable
    /// capture fails its own pair without touching the others.
    pub fn start(&mut self) -> Result<(), ComparatorError> {
        let cfg = self.cfg.clone().ok_or(ComparatorError::NotConfigured)?;
        info!("Starting comparator.");

        for (rpt_dir, (exp_path, act_path)) in cfg.rpt_dirs.iter().zip(cfg.pcap_pairs.iter()) {
            let mut rpt = ReportSink::open(rpt_dir, true)?;

            let (exp_pkts, act_pkts) = match (read_pcap(exp_path), read_pcap(act_path)) {
                (Ok(exp), Ok(act)) => (exp, act),
                (exp, act) => {
                    for res in [exp, act] {
                        if let Err(e) = res {
                            rpt.error(&format!("Failed to load capture: {}", e));
                        }
                    }
                    rpt.error("Not doing any comparison.");
                    rpt.log_fail();
                    self.rptlog = Some(rpt);
                    continue;
                }
            };

            let mut empty = false;
            if exp_pkts.is_empty() {
                rpt.info("Expected packet list is empty.");
                empty = true;
            }
            if act_pkts.is_empty() {
                rpt.info("Actual packet list is empty.");
                empty = true;
            }
            if empty {
                rpt.error("Not doing any comparison.");
                rpt.log_fail();
                self.rptlog = Some(rpt);
                continue;
            }
            if exp_pkts.len() != act_pkts.len() {
                rpt.info(
                    "Expected and actual captures differ in length. \
                     Nevertheless trying to make a comparison ...",
                );
            }

            Self::cmp(&mut rpt, &cfg, &exp_pkts, &act_pkts);
            self.rptlog = Some(rpt);
        }
        Ok(())
    }

    /// Closes the last report sink. Idempotent.
    pub fn stop(&mut self) {
        info!("Stopping comparator.");
        if let Some(mut rpt) = self.rptlog.take() {
            rpt.close();
        }
    }

    fn cmp(rpt: &mut ReportSink, cfg: &CmpConfig, exp_pkts: &[Packet], act_pkts: &[Packet]) {
        // Packet numbering starts at 1, matching what wireshark shows.
        let cmp_res: Vec<bool> = exp_pkts
            .iter()
            .zip(act_pkts.iter())
            .enumerate()
            .map(|(i, (a, b))| Self::packet_eq(rpt, &cfg.entries, i + 1, a, b))
            .collect();
        let time_chk = Self::process_time_ranges(rpt, cfg, exp_pkts, act_pkts);

        if cmp_res.iter().all(|&r| r) && time_chk {
            rpt.info("ooooooo All packet comparisons were successful. ooooooo");
            rpt.log_pass();
        } else {
            rpt.error("fffffff Not all packet comparisons were successful. fffffff");
            rpt.log_fail();
        }
    }

    /// Compares one packet pair against every comparator entry. A layer
    /// present in exactly one of the two packets is a structural
    /// mismatch that fails the pair outright.
    fn packet_eq(
        rpt: &mut ReportSink,
        entries: &[ComparatorEntry],
        idx: usize,
        a: &Packet,
        b: &Packet,
    ) -> bool {
        let mut cmp_merge = Vec::new();
        let mut pkt_mismatch = false;
        for entry in entries {
            match (a.layer(entry.layer), b.layer(entry.layer)) {
                (Some(layer_a), Some(layer_b)) => {
                    for getter in &entry.field_getters {
                        match ((getter.get)(layer_a), (getter.get)(layer_b)) {
                            (Some(val_a), Some(val_b)) => {
                                let cmp_fn = entry.cmp_fn.unwrap_or(default_field_cmp);
                                cmp_merge.push(cmp_fn(rpt, idx, &val_a, &val_b));
                            }
                            _ => {
                                rpt.error(&format!(
                                    "Packet number {:4}: field {} missing in at least one {} layer",
                                    idx, getter.name, entry.layer
                                ));
                                cmp_merge.push(false);
                            }
                        }
                    }
                }
                (None, None) => {}
                _ => {
                    pkt_mismatch = true;
                    rpt.error(&format!(
                        "{} is not present in packet a AND packet b.",
                        entry.layer
                    ));
                }
            }
        }
        cmp_merge.iter().all(|&r| r) && !pkt_mismatch
    }

    /// Checks inter-packet times for both targets. A target without
    /// configured ranges passes vacuously.
    fn process_time_ranges(
        rpt: &mut ReportSink,
        cfg: &CmpConfig,
        exp_pkts: &[Packet],
        act_pkts: &[Packet],
    ) -> bool {
        let checks = [
            ("GP", &cfg.times_gp, exp_pkts),
            ("PUT", &cfg.times_put, act_pkts),
        ];
        let mut results = Vec::with_capacity(checks.len());
        for (descr, ranges, pkts) in checks {
            match ranges {
                Some(ranges) if !ranges.is_empty() => {
                    rpt.info(&format!("Timing ranges to check for {}: {:?}", descr, ranges));
                    results.push(Self::chk_pkt_times(rpt, descr, ranges, pkts));
                }
                _ => {
                    rpt.info(&format!("No timing values present for target: {}", descr));
                    results.push(true);
                }
            }
        }
        results.iter().all(|&r| r)
    }

    /// Checks every consecutive packet-pair delay against the range
    /// list, cycling the list when the capture is longer.
    fn chk_pkt_times(
        rpt: &mut ReportSink,
        descr: &str,
        ranges: &[TimingRange],
        pkts: &[Packet],
    ) -> bool {
        let mut results = Vec::new();
        for (i, (pair, range)) in pkts.windows(2).zip(ranges.iter().cycle()).enumerate() {
            let idx = i + 1;
            let diff = pair[1].timestamp - pair[0].timestamp;
            rpt.debug(&format!(
                "Between packet {:4} and {:4} ( {} ):",
                idx,
                idx + 1,
                descr
            ));
            rpt.debug(&format!("diff : {:.6} s", diff));
            rpt.debug(&format!("mu   : {:.6} s", range.mu));
            rpt.debug(&format!("sigma: {:.6} s", range.sigma));

            let left = (range.mu - SIGMA_TIMES * range.sigma).max(0.0);
            let right = range.mu + SIGMA_TIMES * range.sigma;
            rpt.debug(&format!("Expected range: [ {:.6}, ..., {:.6} ] s", left, right));
            if diff >= left && diff <= right {
                rpt.debug(&format!(
                    "Inter packet time in range between packet {:4} and {:4}",
                    idx,
                    idx + 1
                ));
                results.push(true);
            } else {
                rpt.error(&format!(
                    "Timing violation on {} between packet {:4} and {:4}",
                    descr,
                    idx,
                    idx + 1
                ));
                rpt.error(&format!("Expected range: [ {:.6}, ..., {:.6} ] s", left, right));
                rpt.error(&format!("Actual value: {:.6} s", diff));
                results.push(false);
            }
        }
        let all_ok = results.iter().all(|&r| r);
        rpt.debug(&format!("Packet times check: {}", all_ok));
        all_ok
    }
}

/// Default per-field check: strict equality, mismatches logged with
/// both values.
fn default_field_cmp(rpt: &mut ReportSink, idx: usize, a: &FieldValue, b: &FieldValue) -> bool {
    if a == b {
        true
    } else {
        rpt.error(&format!(
            "Packet number {:4}: Expected value: {}, actual value: {}",
            idx, a, b
        ));
        false
    }
}
