//! Per-comparison report file.
//!
//! Every pcap pair gets its own `report.txt` next to the expected
//! capture. Lines are timestamped and mirrored to the process log so
//! the verdict shows up both on the console and in the dump tree.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, error, info};

const FAIL_BANNER: &str = "

    8888888888     d8888 8888888 888
    888           d88888   888   888
    888          d88P888   888   888
    8888888     d88P 888   888   888
    888        d88P  888   888   888
    888       d88P   888   888   888
    888      d8888888888   888   888
    888     d88P     888 8888888 88888888
";

const PASS_BANNER: &str = r"

      ___         ___           ___           ___
     /\  \       /\  \         /\__\         /\__\
    /::\  \     /::\  \       /:/ _/_       /:/ _/_
   /:/\:\__\   /:/\:\  \     /:/ /\  \     /:/ /\  \
  /:/ /:/  /  /:/ /::\  \   /:/ /::\  \   /:/ /::\  \
 /:/_/:/  /  /:/_/:/\:\__\ /:/_/:/\:\__\ /:/_/:/\:\__\
 \:\/:/  /   \:\/:/  \/__/ \:\/:/ /:/  / \:\/:/ /:/  /
  \::/__/     \::/__/       \::/ /:/  /   \::/ /:/  /
   \:\  \      \:\  \        \/_/:/  /     \/_/:/  /
    \:\__\      \:\__\         /:/  /        /:/  /
     \/__/       \/__/         \/__/         \/__/
";

pub struct ReportSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    also_log: bool,
}

impl ReportSink {
    /// Creates (truncating) `<report_dir>/report.txt`, world readable
    /// and writable so post-run tooling can pick it up regardless of
    /// the uid the harness ran under.
    pub fn open(report_dir: &Path, also_log: bool) -> io::Result<Self> {
        let path = report_dir.join("report.txt");
        let file = File::create(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            also_log,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&mut self, msg: &str) {
        if self.also_log {
            info!("{}", msg);
        }
        self.write_line("INFO", msg);
    }

    pub fn error(&mut self, msg: &str) {
        if self.also_log {
            error!("{}", msg);
        }
        self.write_line("ERROR", msg);
    }

    pub fn debug(&mut self, msg: &str) {
        if self.also_log {
            debug!("{}", msg);
        }
        self.write_line("DEBUG", msg);
    }

    fn write_line(&mut self, level: &str, msg: &str) {
        if let Some(writer) = self.writer.as_mut() {
            let ts = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            // A failed report line must not abort the comparison run.
            if let Err(e) = writeln!(writer, "{} [{:<5}]  {}", ts, level, msg) {
                error!("Failed to write report line: {}", e);
            }
        }
    }

    /// Flushes buffered lines to disk without closing the sink.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!("Failed to flush report {}: {}", self.path.display(), e);
            }
        }
    }

    /// Flushes and closes the report file. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                error!("Failed to flush report {}: {}", self.path.display(), e);
            }
        }
    }

    /// Writes the pass banner, one report line per banner line. The
    /// banner ends a comparison, so the report is flushed to disk here
    /// rather than waiting for teardown.
    pub fn log_pass(&mut self) {
        for line in PASS_BANNER.lines() {
            self.info(line);
        }
        self.flush();
    }

    /// Writes the fail banner, one report line per banner line and
    /// flushes, like [`ReportSink::log_pass`].
    pub fn log_fail(&mut self) {
        for line in FAIL_BANNER.lines() {
            self.error(line);
        }
        self.flush();
    }
}

impl Drop for ReportSink {
    fn drop(&mut self) {
        self.close();
    }
}
