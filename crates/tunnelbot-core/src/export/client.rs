// Client config generation: the client's own setup wizard when it works,
// otherwise a template filled from the endpoint artifact.

use std::path::{Path, PathBuf};

use strum::Display;
use toml::{Table, Value};

use super::profile::ArtifactFields;
use crate::error::CoreError;

const INCLUDED_ROUTES: [&str; 3] = ["0.0.0.0/0", "2000::/3", "10.3.2.1/32"];
const EXCLUDED_ROUTES: [&str; 5] = [
    "0.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "224.0.0.0/3",
];
const MTU: i64 = 1500;

/// How a client config was produced, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ClientVariant {
    SetupWizard,
    Template,
}

/// A generated client config on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub path: PathBuf,
    pub content: String,
    pub variant: ClientVariant,
    /// Certificate verification is disabled in the generated config.
    pub skip_verification: bool,
}

/// `<dir>/alice.endpoint.toml` -> `<dir>/alice.client.toml`.
pub(crate) fn client_path_for(artifact: &Path) -> PathBuf {
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".endpoint.toml")
        .map(str::to_owned)
        .or_else(|| {
            artifact
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "client".into());
    artifact.with_file_name(format!("{stem}.client.toml"))
}

/// Set `dns_upstreams` at the top level of a wizard-produced document.
pub(crate) fn merge_dns(path: &Path, text: &str, dns: &[String]) -> Result<String, CoreError> {
    if dns.is_empty() {
        return Ok(text.to_owned());
    }
    let mut doc: Table =
        toml::from_str(text).map_err(|e| CoreError::corrupt(path, e.message().trim()))?;
    doc.insert("dns_upstreams".into(), string_array(dns));
    toml::to_string(&doc).map_err(|e| CoreError::corrupt(path, e.to_string()))
}

/// Whether a client config turns certificate verification off.
pub(crate) fn skips_verification(text: &str) -> bool {
    let Ok(doc) = toml::from_str::<Table>(text) else {
        return false;
    };
    let flag = |t: &Table| t.get("skip_verification").and_then(Value::as_bool);
    flag(&doc)
        .or_else(|| doc.get("endpoint").and_then(Value::as_table).and_then(flag))
        .unwrap_or(false)
}

/// Render the template client config. Returns the text and whether
/// certificate verification had to be disabled.
pub(crate) fn render_template(fields: &ArtifactFields, dns: &[String]) -> Result<(String, bool), CoreError> {
    let mut doc = Table::new();
    doc.insert("vpn_mode".into(), "general".into());
    doc.insert("killswitch_enabled".into(), true.into());
    if !dns.is_empty() {
        doc.insert("dns_upstreams".into(), string_array(dns));
    }

    let mut endpoint = Table::new();
    endpoint.insert("hostname".into(), fields.hostname.clone().into());
    endpoint.insert("addresses".into(), string_array(&fields.addresses));
    if let Some(has_ipv6) = fields.has_ipv6 {
        endpoint.insert("has_ipv6".into(), has_ipv6.into());
    }
    endpoint.insert("username".into(), fields.username.clone().into());
    endpoint.insert("password".into(), fields.password.clone().into());
    endpoint.insert("upstream_protocol".into(), fields.protocol.clone().into());
    if let Some(fallback) = &fields.fallback_protocol {
        endpoint.insert("upstream_fallback_protocol".into(), fallback.clone().into());
    }
    if let Some(anti_dpi) = fields.anti_dpi {
        endpoint.insert("anti_dpi".into(), anti_dpi.into());
    }
    let skip_verification = match &fields.certificate {
        Some(cert) => {
            endpoint.insert("certificate".into(), cert.clone().into());
            false
        }
        None => {
            endpoint.insert("skip_verification".into(), true.into());
            true
        }
    };
    doc.insert("endpoint".into(), Value::Table(endpoint));

    let mut tun = Table::new();
    tun.insert("bound_if".into(), "".into());
    tun.insert("included_routes".into(), str_array(&INCLUDED_ROUTES));
    tun.insert("excluded_routes".into(), str_array(&EXCLUDED_ROUTES));
    tun.insert("mtu_size".into(), MTU.into());
    tun.insert("change_system_dns".into(), true.into());
    let mut listener = Table::new();
    listener.insert("tun".into(), Value::Table(tun));
    doc.insert("listener".into(), Value::Table(listener));

    let text = toml::to_string(&doc)
        .map_err(|e| CoreError::validation(format!("cannot render client template: {e}")))?;
    Ok((text, skip_verification))
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn str_array(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::String((*s).to_owned())).collect())
}
