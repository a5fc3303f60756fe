// ── Runtime service configuration ──
//
// These types describe *where* the shared stores live and *how* to talk to
// the endpoint service. They never touch disk: the config crate reads
// `bot.toml` and hands a `ServiceConfig` in.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Locations of the shared store files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// `[[client]]` credentials file read by the endpoint.
    pub credentials: PathBuf,
    /// `[[rule]]` access rules file. Rule management is disabled without it.
    pub rules: Option<PathBuf>,
}

/// Everything needed to run the external config generators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Endpoint binary that prints a per-client endpoint config.
    pub endpoint_binary: PathBuf,
    /// Client binary offering the `setup_wizard` subcommand.
    pub client_binary: PathBuf,
    pub vpn_config: Option<PathBuf>,
    pub hosts_config: Option<PathBuf>,
    /// Public `host[:port]` clients connect to.
    pub public_address: Option<String>,
    /// DNS upstreams written into client configs.
    pub dns_upstreams: Vec<String>,
    /// Where generated artifacts are written.
    pub artifact_dir: PathBuf,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            endpoint_binary: PathBuf::from("trusttunnel_endpoint"),
            client_binary: PathBuf::from("trusttunnel_client"),
            vpn_config: None,
            hosts_config: None,
            public_address: None,
            dns_upstreams: Vec::new(),
            artifact_dir: std::env::temp_dir().join("tunnelbot"),
        }
    }
}

/// How to make the endpoint observe a store change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// HTTP hook for a live reload. Absent means restart only.
    pub reload_endpoint: Option<Url>,
    /// Bound on the reload request.
    pub reload_timeout: Duration,
    /// Supervised service name, appended to `restart_command`.
    pub service_name: String,
    /// Restart primitive argv prefix, e.g. `["systemctl", "restart"]`.
    pub restart_command: Vec<String>,
    /// Bound on the restart command.
    pub restart_timeout: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            reload_endpoint: None,
            reload_timeout: Duration::from_secs(5),
            service_name: "trusttunnel".into(),
            restart_command: vec!["systemctl".into(), "restart".into()],
            restart_timeout: Duration::from_secs(30),
        }
    }
}

/// Process-wide configuration, read-only after startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub stores: StorePaths,
    pub endpoint: EndpointSettings,
    pub reconcile: ReconcileConfig,
    /// Bound on every external generator invocation.
    pub command_timeout: Duration,
    /// Telegram user ids allowed to administer the service.
    pub admin_ids: HashSet<i64>,
    /// Panel sessions idle longer than this are closed.
    pub session_idle_timeout: Duration,
}

impl ServiceConfig {
    /// Minimal config around a credentials file, defaults elsewhere.
    pub fn new(credentials: impl Into<PathBuf>) -> Self {
        Self {
            stores: StorePaths {
                credentials: credentials.into(),
                rules: None,
            },
            endpoint: EndpointSettings::default(),
            reconcile: ReconcileConfig::default(),
            command_timeout: Duration::from_secs(30),
            admin_ids: HashSet::new(),
            session_idle_timeout: Duration::from_secs(3600),
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}
