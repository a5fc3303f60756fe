#![allow(dead_code, clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tunnelbot_core::{Backend, ReconcileConfig, ServiceConfig};
use url::Url;

/// Temp directory holding both stores, a restart log and fake tools.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.dir.path().join("credentials.toml")
    }

    pub fn rules_path(&self) -> PathBuf {
        self.dir.path().join("rules.toml")
    }

    pub fn restart_log(&self) -> PathBuf {
        self.dir.path().join("restarts.log")
    }

    /// Restart command that appends the service name to the restart log.
    pub fn counting_restart(&self) -> Vec<String> {
        vec![
            "sh".into(),
            "-c".into(),
            format!("echo \"$1\" >> '{}'", self.restart_log().display()),
            "sh".into(),
        ]
    }

    pub fn restart_count(&self) -> usize {
        std::fs::read_to_string(self.restart_log())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(self.credentials_path());
        config.stores.rules = Some(self.rules_path());
        config.reconcile = ReconcileConfig {
            restart_command: self.counting_restart(),
            restart_timeout: Duration::from_secs(5),
            ..ReconcileConfig::default()
        };
        config.endpoint.artifact_dir = self.dir.path().join("artifacts");
        config.command_timeout = Duration::from_secs(5);
        config
    }

    pub fn config_with_reload(&self, reload: &str) -> ServiceConfig {
        let mut config = self.config();
        config.reconcile.reload_endpoint = Some(Url::parse(reload).unwrap());
        config.reconcile.reload_timeout = Duration::from_millis(500);
        config
    }

    pub fn backend(&self) -> Backend {
        Backend::new(self.config()).unwrap()
    }

    /// Write an executable `/bin/sh` script and return its path.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
