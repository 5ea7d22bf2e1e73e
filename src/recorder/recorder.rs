//! Multi-interface packet recorder.
//!
//! One `Recorder` per target captures traffic on one or two interfaces
//! concurrently while the generator runs, then persists every capture
//! to its own pcap file. The capture engine is injected through
//! [`SessionFactory`] so tests drive the state machine with scripted
//! sessions.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::configuration::types::{RecorderConfig, TargetLabel};
use crate::error_handling::types::CaptureError;
use crate::packet_model::live::{CaptureSession, SessionFactory};
use crate::packet_model::pcap_io::write_pcap;

/// Settle time after issuing start to all sessions, so early packets
/// are not lost to capture-engine startup latency.
const CAPTURE_SETTLE: Duration = Duration::from_secs(1);

pub struct Recorder {
    target: TargetLabel,
    cfg: RecorderConfig,
    factory: Arc<dyn SessionFactory>,
    sessions: Vec<Box<dyn CaptureSession>>,
    recording: bool,
}

impl Recorder {
    pub fn new(target: TargetLabel, cfg: RecorderConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            target,
            cfg,
            factory,
            sessions: Vec::new(),
            recording: false,
        }
    }

    pub fn target(&self) -> TargetLabel {
        self.target
    }

    pub fn cfg(&self) -> &RecorderConfig {
        &self.cfg
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Starts a capture session on every configured interface. Invalid
    /// while already capturing: a second call is a guarded no-op, not a
    /// restart.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.recording {
            warn!("[{}] Recorder is already capturing.", self.target);
            return Ok(());
        }

        for rec_if in self.cfg.rec_ifs.clone() {
            let opened = self
                .factory
                .open(&rec_if.if_name, rec_if.filter_expr.as_deref())
                .and_then(|mut session| session.start().map(|()| session));
            let session = match opened {
                Ok(session) => session,
                Err(e) => {
                    // A half-started recorder must not keep earlier
                    // interfaces capturing behind a guarded stop().
                    self.discard_sessions().await;
                    return Err(e);
                }
            };
            info!(
                "[{}] Capture started on {} (filter: {:?})",
                self.target,
                rec_if.if_name,
                rec_if.filter_expr.as_deref()
            );
            self.sessions.push(session);
        }

        // Give the capture engine a little time to start recording.
        sleep(CAPTURE_SETTLE).await;
        self.recording = true;
        Ok(())
    }

    /// Stops every capture session, joins their threads and writes one
    /// pcap file per interface, in configuration order. No-op (logged)
    /// when not capturing.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.recording {
            info!("[{}] Recording already stopped.", self.target);
            return Ok(());
        }

        // Catch trailing response traffic before tearing down.
        sleep(Duration::from_secs(self.cfg.pause_before_stop)).await;

        let sessions = std::mem::take(&mut self.sessions);
        // The sessions are gone either way; a failure below must not
        // leave the recorder claiming to capture.
        self.recording = false;
        let packet_lists = tokio::task::spawn_blocking(move || {
            sessions
                .into_iter()
                .map(|session| session.stop())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| CaptureError::SessionFailed(e.to_string()))?;

        for (packets, rec_if) in packet_lists.into_iter().zip(self.cfg.rec_ifs.iter_mut()) {
            let packets = packets?;
            let filename = rec_if
                .wr_path
                .join(format!("{}_{}.pcap", rec_if.if_name, rec_if.target));
            write_pcap(&filename, &packets)?;
            info!(
                "[{}] Wrote {} packets captured on {} to {}",
                self.target,
                packets.len(),
                rec_if.if_name,
                filename.display()
            );
            rec_if.pcap_path = Some(filename);
        }

        Ok(())
    }

    /// Stops and joins every session started so far, dropping their
    /// packets. Used when a partial start has to be rolled back.
    async fn discard_sessions(&mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        if sessions.is_empty() {
            return;
        }
        let target = self.target;
        let joined = tokio::task::spawn_blocking(move || {
            sessions
                .into_iter()
                .map(|session| {
                    let name = session.if_name().to_string();
                    (name, session.stop())
                })
                .collect::<Vec<_>>()
        })
        .await;
        match joined {
            Ok(results) => {
                for (if_name, result) in results {
                    if let Err(e) = result {
                        warn!("[{}] Rollback stop on {} failed: {}", target, if_name, e);
                    }
                }
            }
            Err(e) => warn!("[{}] Rollback join failed: {}", target, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::RecInterfaceConfig;
    use crate::packet_model::decode::decode_frame;
    use crate::packet_model::types::Packet;
    use etherparse::PacketBuilder;
    use std::path::Path;
    use std::sync::Mutex;

    struct ScriptedSession {
        if_name: String,
        packets: Vec<Packet>,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl CaptureSession for ScriptedSession {
        fn if_name(&self) -> &str {
            &self.if_name
        }

        fn filter_expr(&self) -> Option<&str> {
            None
        }

        fn start(&mut self) -> Result<(), CaptureError> {
            self.started.lock().unwrap().push(self.if_name.clone());
            Ok(())
        }

        fn stop(self: Box<Self>) -> Result<Vec<Packet>, CaptureError> {
            Ok(self.packets)
        }
    }

    struct ScriptedFactory {
        packets: Vec<Packet>,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl SessionFactory for ScriptedFactory {
        fn open(
            &self,
            if_name: &str,
            _filter_expr: Option<&str>,
        ) -> Result<Box<dyn CaptureSession>, CaptureError> {
            Ok(Box::new(ScriptedSession {
                if_name: if_name.to_string(),
                packets: self.packets.clone(),
                started: Arc::clone(&self.started),
            }))
        }
    }

    fn echo_packet(seq: u16, ts: f64) -> Packet {
        let builder = PacketBuilder::ethernet2([0; 6], [1; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .icmpv4_echo_request(1, seq);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        decode_frame(ts, &frame)
    }

    fn rec_cfg(dir: &Path, target: TargetLabel, if_names: &[&str]) -> RecorderConfig {
        RecorderConfig {
            rec_ifs: if_names
                .iter()
                .map(|name| RecInterfaceConfig {
                    if_name: name.to_string(),
                    target,
                    wr_path: dir.to_path_buf(),
                    filter_expr: Some("icmp".to_string()),
                    pcap_path: None,
                })
                .collect(),
            pause_before_stop: 0,
        }
    }

    fn scripted(packets: Vec<Packet>) -> (Arc<ScriptedFactory>, Arc<Mutex<Vec<String>>>) {
        let started = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(ScriptedFactory {
            packets,
            started: Arc::clone(&started),
        });
        (factory, started)
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop_and_writes_nothing() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let (factory, _) = scripted(vec![]);
        let mut rec = Recorder::new(
            TargetLabel::Gp,
            rec_cfg(dir.path(), TargetLabel::Gp, &["va0"]),
            factory,
        );

        rec.stop().await.unwrap();
        assert!(!rec.is_recording());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert!(rec.cfg().rec_ifs[0].pcap_path.is_none());
    }

    #[tokio::test]
    async fn start_twice_does_not_restart_sessions() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let (factory, started) = scripted(vec![]);
        let mut rec = Recorder::new(
            TargetLabel::Gp,
            rec_cfg(dir.path(), TargetLabel::Gp, &["va0"]),
            factory,
        );

        rec.start().await.unwrap();
        rec.start().await.unwrap();
        assert_eq!(started.lock().unwrap().len(), 1);
        rec.stop().await.unwrap();
    }

    #[tokio::test]
    async fn two_interfaces_produce_two_deterministically_named_files() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let packets = vec![echo_packet(1, 1.0), echo_packet(2, 2.0)];
        let (factory, started) = scripted(packets);
        let mut rec = Recorder::new(
            TargetLabel::Put,
            rec_cfg(dir.path(), TargetLabel::Put, &["va1", "vb1"]),
            factory,
        );

        rec.start().await.unwrap();
        assert!(rec.is_recording());
        assert_eq!(
            started.lock().unwrap().clone(),
            vec!["va1".to_string(), "vb1".to_string()]
        );

        rec.stop().await.unwrap();
        assert!(!rec.is_recording());

        let a = dir.path().join("va1_PUT.pcap");
        let b = dir.path().join("vb1_PUT.pcap");
        assert!(a.is_file());
        assert!(b.is_file());
        assert_eq!(rec.cfg().rec_ifs[0].pcap_path.as_deref(), Some(a.as_path()));
        assert_eq!(rec.cfg().rec_ifs[1].pcap_path.as_deref(), Some(b.as_path()));

        let read_back = crate::packet_model::pcap_io::read_pcap(&a).unwrap();
        assert_eq!(read_back.len(), 2);
    }

    #[tokio::test]
    async fn second_stop_after_a_stop_is_a_noop() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let (factory, _) = scripted(vec![echo_packet(1, 1.0)]);
        let mut rec = Recorder::new(
            TargetLabel::Gp,
            rec_cfg(dir.path(), TargetLabel::Gp, &["va0"]),
            factory,
        );

        rec.start().await.unwrap();
        rec.stop().await.unwrap();
        let written = std::fs::metadata(dir.path().join("va0_GP.pcap")).unwrap();
        let modified = written.modified().unwrap();

        rec.stop().await.unwrap();
        let after = std::fs::metadata(dir.path().join("va0_GP.pcap")).unwrap();
        assert_eq!(after.modified().unwrap(), modified);
    }

    /// Session that records its lifecycle events and optionally fails
    /// on stop.
    struct LoggingSession {
        if_name: String,
        events: Arc<Mutex<Vec<String>>>,
        fail_stop: bool,
    }

    impl CaptureSession for LoggingSession {
        fn if_name(&self) -> &str {
            &self.if_name
        }

        fn filter_expr(&self) -> Option<&str> {
            None
        }

        fn start(&mut self) -> Result<(), CaptureError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {}", self.if_name));
            Ok(())
        }

        fn stop(self: Box<Self>) -> Result<Vec<Packet>, CaptureError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("stop {}", self.if_name));
            if self.fail_stop {
                Err(CaptureError::SessionFailed("engine went away".to_string()))
            } else {
                Ok(vec![])
            }
        }
    }

    /// Factory that refuses interfaces whose name starts with "bad".
    struct FlakyFactory {
        events: Arc<Mutex<Vec<String>>>,
        fail_stop: bool,
    }

    impl SessionFactory for FlakyFactory {
        fn open(
            &self,
            if_name: &str,
            _filter_expr: Option<&str>,
        ) -> Result<Box<dyn CaptureSession>, CaptureError> {
            if if_name.starts_with("bad") {
                return Err(CaptureError::InterfaceNotFound(if_name.to_string()));
            }
            Ok(Box::new(LoggingSession {
                if_name: if_name.to_string(),
                events: Arc::clone(&self.events),
                fail_stop: self.fail_stop,
            }))
        }
    }

    #[tokio::test]
    async fn failed_start_tears_down_already_started_sessions() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(FlakyFactory {
            events: Arc::clone(&events),
            fail_stop: false,
        });
        let mut rec = Recorder::new(
            TargetLabel::Gp,
            rec_cfg(dir.path(), TargetLabel::Gp, &["good0", "bad1"]),
            factory,
        );

        assert!(matches!(
            rec.start().await,
            Err(CaptureError::InterfaceNotFound(_))
        ));
        assert!(!rec.is_recording());
        assert_eq!(
            events.lock().unwrap().clone(),
            vec!["start good0".to_string(), "stop good0".to_string()]
        );

        // Nothing left to stop, so a stop() must not write pcaps.
        rec.stop().await.unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn failed_stop_still_clears_the_capturing_state() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(FlakyFactory {
            events: Arc::clone(&events),
            fail_stop: true,
        });
        let mut rec = Recorder::new(
            TargetLabel::Put,
            rec_cfg(dir.path(), TargetLabel::Put, &["good0"]),
            factory,
        );

        rec.start().await.unwrap();
        assert!(rec.stop().await.is_err());
        assert!(!rec.is_recording());
        rec.stop().await.unwrap();
    }
}
