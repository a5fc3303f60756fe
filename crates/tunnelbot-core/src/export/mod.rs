// ── Per-user config export ──
//
// Drives the endpoint's own generator for the server-side artifact, then
// derives a client config and a connection summary from it. Artifacts go
// to `artifact_dir` and are replaced atomically on every export.

mod client;
mod profile;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

pub use client::{ClientConfig, ClientVariant};
pub use profile::{ConnectionProfile, build_connection_profile, format_profile};

use self::client::{client_path_for, merge_dns, render_template, skips_verification};
use self::profile::ArtifactFields;
use crate::config::EndpointSettings;
use crate::error::CoreError;
use crate::process::run_tool;
use crate::store::{CredentialRegistry, write_atomic};

/// Endpoint-side config generated for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointArtifact {
    pub username: String,
    pub path: PathBuf,
    pub content: String,
}

/// Everything produced by one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBundle {
    pub endpoint: EndpointArtifact,
    pub client: ClientConfig,
    pub profile: ConnectionProfile,
}

#[derive(Debug, Clone)]
pub struct EndpointExporter {
    settings: EndpointSettings,
    timeout: Duration,
    credentials: CredentialRegistry,
}

impl EndpointExporter {
    pub fn new(settings: EndpointSettings, timeout: Duration, credentials: CredentialRegistry) -> Self {
        Self {
            settings,
            timeout,
            credentials,
        }
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    /// Run the endpoint generator for `username` and keep its output.
    pub async fn generate_endpoint_config(&self, username: &str) -> Result<EndpointArtifact, CoreError> {
        if self.credentials.find(username).await?.is_none() {
            return Err(CoreError::UserNotFound {
                username: username.to_owned(),
            });
        }

        let (vpn_config, hosts_config, address) = self.generator_inputs()?;
        let args: [OsString; 6] = [
            vpn_config.into(),
            hosts_config.into(),
            "-c".into(),
            username.into(),
            "-a".into(),
            address.into(),
        ];
        let output = run_tool(&self.settings.endpoint_binary, &args, self.timeout).await?;
        if output.stdout.trim().is_empty() {
            return Err(CoreError::ExternalToolFailed {
                tool: self.settings.endpoint_binary.display().to_string(),
                code: Some(0),
                stderr: "generator printed no config".into(),
            });
        }

        let dir = &self.settings.artifact_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CoreError::io(dir, e))?;
        let path = dir.join(format!("{username}.endpoint.toml"));
        write_atomic(path.clone(), output.stdout.clone().into_bytes()).await?;

        info!(username, artifact = %path.display(), "endpoint config generated");
        Ok(EndpointArtifact {
            username: username.to_owned(),
            path,
            content: output.stdout,
        })
    }

    /// Build a client config from an endpoint artifact, trying the client's
    /// setup wizard before falling back to the built-in template.
    pub async fn generate_client_config(
        &self,
        artifact: &Path,
        dns_upstreams: &[String],
    ) -> Result<ClientConfig, CoreError> {
        let out = client_path_for(artifact);

        match self.run_wizard(artifact, &out).await {
            Ok(raw) => {
                let content = merge_dns(&out, &raw, dns_upstreams)?;
                write_atomic(out.clone(), content.clone().into_bytes()).await?;
                info!(config = %out.display(), "client config from setup wizard");
                return Ok(ClientConfig {
                    skip_verification: skips_verification(&content),
                    path: out,
                    content,
                    variant: ClientVariant::SetupWizard,
                });
            }
            Err(e) => warn!(error = %e, "setup wizard unavailable, using template"),
        }

        let text = tokio::fs::read_to_string(artifact)
            .await
            .map_err(|e| CoreError::io(artifact, e))?;
        let fields = ArtifactFields::parse(artifact, &text)?;
        let (content, skip_verification) = render_template(&fields, dns_upstreams)?;
        write_atomic(out.clone(), content.clone().into_bytes()).await?;

        info!(config = %out.display(), skip_verification, "client config from template");
        Ok(ClientConfig {
            path: out,
            content,
            variant: ClientVariant::Template,
            skip_verification,
        })
    }

    /// Endpoint artifact, client config and connection summary for a user.
    pub async fn export(&self, username: &str) -> Result<ExportBundle, CoreError> {
        let endpoint = self.generate_endpoint_config(username).await?;
        let profile = build_connection_profile(&endpoint.path).await?;
        let client = self
            .generate_client_config(&endpoint.path, &self.settings.dns_upstreams)
            .await?;
        Ok(ExportBundle {
            endpoint,
            client,
            profile,
        })
    }

    async fn run_wizard(&self, artifact: &Path, out: &Path) -> Result<String, CoreError> {
        match tokio::fs::remove_file(out).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::io(out, e)),
        }

        let args: [OsString; 7] = [
            "setup_wizard".into(),
            "--mode".into(),
            "non-interactive".into(),
            "--endpoint_config".into(),
            artifact.into(),
            "--settings".into(),
            out.into(),
        ];
        run_tool(&self.settings.client_binary, &args, self.timeout).await?;

        tokio::fs::read_to_string(out)
            .await
            .map_err(|e| CoreError::io(out, e))
    }

    fn generator_inputs(&self) -> Result<(&Path, &Path, &str), CoreError> {
        let missing = |key: &str| CoreError::Config {
            message: format!("{key} must be set to export configs"),
        };
        let vpn = self
            .settings
            .vpn_config
            .as_deref()
            .ok_or_else(|| missing("vpn_config"))?;
        let hosts = self
            .settings
            .hosts_config
            .as_deref()
            .ok_or_else(|| missing("hosts_config"))?;
        let address = self
            .settings
            .public_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| missing("endpoint_public_address"))?;
        Ok((vpn, hosts, address))
    }
}
