// Reading connection fields out of a generated endpoint artifact.
//
// The endpoint tool has emitted these fields both at the top level and
// nested under `[endpoint]`, `[client]` or `[connection]` across
// versions, so lookups check each place in turn.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::CoreError;

const SECTIONS: [&str; 3] = ["endpoint", "client", "connection"];

/// Everything a client needs to connect, as read from an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub hostname: String,
    pub addresses: Vec<String>,
    pub protocol: String,
    pub dns_upstreams: Vec<String>,
    pub username: String,
    pub password: String,
}

/// Raw fields of an endpoint artifact, required and optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtifactFields {
    pub hostname: String,
    pub addresses: Vec<String>,
    pub username: String,
    pub password: String,
    pub protocol: String,
    pub fallback_protocol: Option<String>,
    pub has_ipv6: Option<bool>,
    pub anti_dpi: Option<bool>,
    pub certificate: Option<String>,
    pub dns_upstreams: Vec<String>,
}

impl ArtifactFields {
    pub(crate) fn parse(path: &Path, text: &str) -> Result<Self, CoreError> {
        let doc: toml::Table = toml::from_str(text)
            .map_err(|e| CoreError::corrupt(path, e.message().trim()))?;
        Self::from_table(path, &doc)
    }

    pub(crate) fn from_table(path: &Path, doc: &toml::Table) -> Result<Self, CoreError> {
        let hostname = lookup(doc, &["hostname"]).and_then(as_string);
        let addresses = lookup(doc, &["addresses"])
            .map(as_string_list)
            .filter(|a| !a.is_empty());
        let username = lookup(doc, &["username"]).and_then(as_string);
        let password = lookup(doc, &["password"]).and_then(as_string);
        let protocol = lookup(doc, &["upstream_protocol", "protocol"]).and_then(as_string);

        let mut missing = Vec::new();
        for (name, present) in [
            ("addresses", addresses.is_some()),
            ("hostname", hostname.is_some()),
            ("password", password.is_some()),
            ("protocol", protocol.is_some()),
            ("username", username.is_some()),
        ] {
            if !present {
                missing.push(name.to_owned());
            }
        }

        let (Some(hostname), Some(addresses), Some(username), Some(password), Some(protocol)) =
            (hostname, addresses, username, password, protocol)
        else {
            return Err(CoreError::ArtifactMalformed {
                path: path.to_path_buf(),
                missing,
            });
        };

        Ok(Self {
            hostname,
            addresses,
            username,
            password,
            protocol,
            fallback_protocol: lookup(doc, &["upstream_fallback_protocol"]).and_then(as_string),
            has_ipv6: lookup(doc, &["has_ipv6"]).and_then(toml::Value::as_bool),
            anti_dpi: lookup(doc, &["anti_dpi"]).and_then(toml::Value::as_bool),
            certificate: lookup(doc, &["certificate"]).and_then(as_string),
            dns_upstreams: lookup(doc, &["dns_upstreams"])
                .map(as_string_list)
                .unwrap_or_default(),
        })
    }
}

impl From<ArtifactFields> for ConnectionProfile {
    fn from(f: ArtifactFields) -> Self {
        Self {
            hostname: f.hostname,
            addresses: f.addresses,
            protocol: f.protocol,
            dns_upstreams: f.dns_upstreams,
            username: f.username,
            password: f.password,
        }
    }
}

/// First non-empty value for any of `keys`, top level before sections.
fn lookup<'a>(doc: &'a toml::Table, keys: &[&str]) -> Option<&'a toml::Value> {
    let tables = std::iter::once(doc).chain(
        SECTIONS
            .iter()
            .filter_map(|s| doc.get(*s).and_then(toml::Value::as_table)),
    );
    for table in tables {
        for key in keys {
            if let Some(value) = table.get(*key).filter(|v| !is_blank(v)) {
                return Some(value);
            }
        }
    }
    None
}

fn is_blank(value: &toml::Value) -> bool {
    match value {
        toml::Value::String(s) => s.trim().is_empty(),
        toml::Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn as_string(value: &toml::Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

// Arrays of strings, or a single comma separated string.
fn as_string_list(value: &toml::Value) -> Vec<String> {
    match value {
        toml::Value::Array(items) => items
            .iter()
            .filter_map(toml::Value::as_str)
            .map(str::to_owned)
            .collect(),
        toml::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Read an endpoint artifact and extract its connection profile.
pub async fn build_connection_profile(path: &Path) -> Result<ConnectionProfile, CoreError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::io(path, e))?;
    ArtifactFields::parse(path, &text).map(ConnectionProfile::from)
}

/// Human-readable summary suitable for a chat message.
pub fn format_profile(profile: &ConnectionProfile) -> String {
    let mut out = String::from("Connection details\n");
    let _ = writeln!(out, "Host: {}", profile.hostname);
    let _ = writeln!(out, "Addresses: {}", profile.addresses.join(", "));
    let _ = writeln!(out, "Protocol: {}", profile.protocol);
    if !profile.dns_upstreams.is_empty() {
        let _ = writeln!(out, "DNS: {}", profile.dns_upstreams.join(", "));
    }
    let _ = writeln!(out, "Username: {}", profile.username);
    let _ = write!(out, "Password: {}", profile.password);
    out
}
