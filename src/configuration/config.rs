//! Test-setup loading, validation and per-run filesystem layout.
//!
//! The TOML file carries target identities, interface assignments and
//! the per-case tunables; everything that depends on the current run
//! (the timestamped dump root and the per-case capture directories) is
//! computed here exactly once by the orchestration path and threaded
//! through as explicit values.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error_handling::types::ConfigError;

use super::types::*;

impl TestSetup {
    /// Loads and validates a test setup from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let setup: TestSetup =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        setup.validate()?;
        info!("Test setup loaded from {}", path.display());
        Ok(setup)
    }

    /// Rejects interface-count and exec-time violations before any
    /// process is spawned or capture started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gp_count = self.recorders.gp.interfaces.len();
        let put_count = self.recorders.put.interfaces.len();
        if !(1..=2).contains(&gp_count) {
            return Err(ConfigError::BadInterfaceCount(gp_count));
        }
        if !(1..=2).contains(&put_count) {
            return Err(ConfigError::BadInterfaceCount(put_count));
        }
        if gp_count != put_count {
            return Err(ConfigError::InterfaceCountMismatch(gp_count, put_count));
        }
        for case in [&self.cases.icmp0, &self.cases.tlshs].into_iter().flatten() {
            if case.timeout < 0 {
                return Err(ConfigError::InvalidExecTime(case.timeout));
            }
            if case.prefix.trim().is_empty() && case.cmd.trim().is_empty() {
                return Err(ConfigError::BadCommand(format!(
                    "case {} has an empty command template",
                    case.name
                )));
            }
        }
        Ok(())
    }

    pub fn platform(&self, target: TargetLabel) -> PlatformConfig {
        let section = match target {
            TargetLabel::Gp => &self.golden_platform,
            TargetLabel::Put => &self.platform_under_test,
        };
        PlatformConfig {
            ip: section.ip.clone(),
            netmask: section.netmask.clone(),
            mac: section.mac.clone(),
            port: section.port,
        }
    }

    pub fn gen_interface(&self, target: TargetLabel) -> &str {
        match target {
            TargetLabel::Gp => &self.generators.gp_interface,
            TargetLabel::Put => &self.generators.put_interface,
        }
    }

    pub fn rec_interfaces(&self, target: TargetLabel) -> &[String] {
        match target {
            TargetLabel::Gp => &self.recorders.gp.interfaces,
            TargetLabel::Put => &self.recorders.put.interfaces,
        }
    }

    /// Assembles the generator configuration for one target of a test
    /// case: template substitution, argv split and output-sink choice.
    pub fn generator_config(
        &self,
        target: TargetLabel,
        case: &CaseConfig,
    ) -> Result<GeneratorConfig, ConfigError> {
        let platform = self.platform(target);
        let gen_if = self.gen_interface(target).to_string();
        let gen_cmd = render_command(&case.prefix, &case.cmd, &gen_if, &platform.ip)?;
        let sink = if self.generators.silence {
            OutputSink::Discard
        } else {
            OutputSink::Inherit
        };
        Ok(GeneratorConfig {
            gen_if,
            platform,
            gen_cmd,
            exec_time: case.timeout,
            stdout: sink,
            stderr: sink,
        })
    }

    /// Assembles the recorder configuration for one target of a test
    /// case, creating the capture directory tree
    /// `<dump_root>/<case_name>/<A|B>` as a side effect.
    pub fn recorder_config(
        &self,
        target: TargetLabel,
        case: &CaseConfig,
        dump_root: &Path,
    ) -> Result<RecorderConfig, ConfigError> {
        let case_dir = dump_root.join(&case.name);
        create_directory(&case_dir)?;

        let mut rec_ifs = Vec::new();
        for (idx, if_name) in self.rec_interfaces(target).iter().enumerate() {
            // Vantage-point subdirectories are lettered A, B.
            let letter = char::from(b'A' + idx as u8);
            let wr_path = case_dir.join(letter.to_string());
            create_directory(&wr_path)?;
            rec_ifs.push(RecInterfaceConfig {
                if_name: if_name.clone(),
                target,
                wr_path,
                filter_expr: Some(case.filter_expr.clone()),
                pcap_path: None,
            });
        }
        Ok(RecorderConfig {
            rec_ifs,
            pause_before_stop: case.pause_before_stop,
        })
    }
}

/// Substitutes `{gen_if}` and `{ip}` into the command template and
/// splits it into an argv vector, dropping empty tokens.
pub fn render_command(
    prefix: &str,
    cmd: &str,
    gen_if: &str,
    ip: &str,
) -> Result<Vec<String>, ConfigError> {
    let rendered = format!("{} {}", prefix, cmd)
        .replace("{gen_if}", gen_if)
        .replace("{ip}", ip);
    let argv: Vec<String> = rendered
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if argv.is_empty() {
        return Err(ConfigError::BadCommand(
            "command template rendered to an empty argv".to_string(),
        ));
    }
    Ok(argv)
}

/// Creates a directory (non-recursively, parents must exist) and makes
/// it world read/write/executable, matching the layout contract for
/// capture and report directories. Existing directories are left alone.
pub fn create_directory(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir(path).map_err(|e| {
        ConfigError::DirectoryCreationFailed(format!("{}: {}", path.display(), e))
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
    }
    Ok(())
}

/// Timestamp string used to name one test-suite run,
/// e.g. `2026-08-30---T-14-03-07-512`.
pub fn create_timestamp_str() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d---T-%H-%M-%S-%3f")
        .to_string()
}

/// Computes and creates the per-run dump root under the configured base
/// path. Called once per run by the orchestrator; everything below it
/// receives the resulting path explicitly.
pub fn make_dump_root(base_path: &Path) -> Result<PathBuf, ConfigError> {
    create_directory(base_path)?;
    let root = base_path.join(format!("{}_test_suite_run", create_timestamp_str()));
    create_directory(&root)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_toml(gp_ifs: &str, put_ifs: &str, timeout: i64) -> String {
        format!(
            r#"
[golden_platform]
ip = "192.168.10.1"
netmask = "255.255.255.0"

[platform_under_test]
ip = "192.168.20.1"
netmask = "255.255.255.0"

[dump]
base_path = "/tmp/netdiff-dumps"

[generators]
silence = true
gp_interface = "eth1"
put_interface = "eth2"

[recorders.gp]
interfaces = {gp_ifs}

[recorders.put]
interfaces = {put_ifs}

[cases.icmp0]
name = "icmp_0"
prefix = "ping"
cmd = "-c 3 -I {{gen_if}} {{ip}}"
timeout = {timeout}
pause_before_stop = 2
filter_expr = "icmp"
time_rngs_gp = [[1.0, 0.1]]
time_rngs_put = [[1.0, 0.1]]
"#
        )
    }

    fn parse(toml_str: &str) -> TestSetup {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn valid_setup_passes_validation() {
        let setup = parse(&setup_toml(r#"["va0", "vb0"]"#, r#"["va1", "vb1"]"#, 0));
        assert!(setup.validate().is_ok());
        assert_eq!(setup.platform(TargetLabel::Gp).ip, "192.168.10.1");
        assert_eq!(setup.gen_interface(TargetLabel::Put), "eth2");
    }

    #[test]
    fn interface_count_parity_is_enforced() {
        let setup = parse(&setup_toml(r#"["va0", "vb0"]"#, r#"["va1"]"#, 0));
        assert!(matches!(
            setup.validate(),
            Err(ConfigError::InterfaceCountMismatch(2, 1))
        ));
    }

    #[test]
    fn interface_count_bounds_are_enforced() {
        let setup = parse(&setup_toml(r#"["a", "b", "c"]"#, r#"["a", "b", "c"]"#, 0));
        assert!(matches!(
            setup.validate(),
            Err(ConfigError::BadInterfaceCount(3))
        ));
    }

    #[test]
    fn negative_exec_time_is_rejected() {
        let setup = parse(&setup_toml(r#"["va0"]"#, r#"["va1"]"#, -3));
        assert!(matches!(
            setup.validate(),
            Err(ConfigError::InvalidExecTime(-3))
        ));
    }

    #[test]
    fn command_rendering_substitutes_and_splits() {
        let argv = render_command("ping", "-c 3  -I {gen_if} {ip}", "eth1", "10.0.0.5").unwrap();
        assert_eq!(argv, vec!["ping", "-c", "3", "-I", "eth1", "10.0.0.5"]);
    }

    #[test]
    fn empty_command_template_is_an_error() {
        assert!(render_command("", "   ", "eth1", "10.0.0.5").is_err());
    }

    #[test]
    fn generator_config_carries_case_timeout_and_sink() {
        let setup = parse(&setup_toml(r#"["va0"]"#, r#"["va1"]"#, 5));
        let case = setup.cases.icmp0.clone().unwrap();
        let cfg = setup.generator_config(TargetLabel::Put, &case).unwrap();
        assert_eq!(cfg.exec_time, 5);
        assert_eq!(cfg.stdout, OutputSink::Discard);
        assert_eq!(cfg.gen_cmd[0], "ping");
        assert!(cfg.gen_cmd.contains(&"192.168.20.1".to_string()));
    }

    #[test]
    fn recorder_config_builds_lettered_dir_tree() {
        let dir = tempfile::tempdir().unwrap();
        let setup = parse(&setup_toml(r#"["va0", "vb0"]"#, r#"["va1", "vb1"]"#, 0));
        let case = setup.cases.icmp0.clone().unwrap();
        let cfg = setup
            .recorder_config(TargetLabel::Gp, &case, dir.path())
            .unwrap();

        assert_eq!(cfg.rec_ifs.len(), 2);
        assert_eq!(cfg.pause_before_stop, 2);
        assert!(cfg.rec_ifs[0].wr_path.ends_with("icmp_0/A"));
        assert!(cfg.rec_ifs[1].wr_path.ends_with("icmp_0/B"));
        assert!(cfg.rec_ifs[0].wr_path.is_dir());
        assert_eq!(cfg.rec_ifs[0].filter_expr.as_deref(), Some("icmp"));
        assert!(cfg.rec_ifs[0].pcap_path.is_none());
    }

    #[test]
    fn timing_ranges_convert() {
        let setup = parse(&setup_toml(r#"["va0"]"#, r#"["va1"]"#, 0));
        let case = setup.cases.icmp0.clone().unwrap();
        let rngs = case.timing_gp().unwrap();
        assert_eq!(rngs.len(), 1);
        assert_eq!(rngs[0], TimingRange { mu: 1.0, sigma: 0.1 });
    }

    #[test]
    fn dump_root_is_timestamped_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_dump_root(dir.path()).unwrap();
        assert!(root.is_dir());
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_test_suite_run"));
    }
}
