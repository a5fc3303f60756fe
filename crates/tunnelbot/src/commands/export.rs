//! `tunnelbot export`: endpoint artifact, client config and connection
//! profile for one user.

use serde::Serialize;

use tunnelbot_core::store::normalize_username;
use tunnelbot_core::{Backend, ExportBundle, format_profile};

use crate::cli::{ExportArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct ExportReport {
    username: String,
    endpoint_config: String,
    client_config: String,
    client_variant: String,
    skip_verification: bool,
    hostname: String,
    addresses: Vec<String>,
    protocol: String,
    dns_upstreams: Vec<String>,
    password: String,
}

impl From<&ExportBundle> for ExportReport {
    fn from(bundle: &ExportBundle) -> Self {
        Self {
            username: bundle.profile.username.clone(),
            endpoint_config: bundle.endpoint.path.display().to_string(),
            client_config: bundle.client.path.display().to_string(),
            client_variant: bundle.client.variant.to_string(),
            skip_verification: bundle.client.skip_verification,
            hostname: bundle.profile.hostname.clone(),
            addresses: bundle.profile.addresses.clone(),
            protocol: bundle.profile.protocol.clone(),
            dns_upstreams: bundle.profile.dns_upstreams.clone(),
            password: bundle.profile.password.clone(),
        }
    }
}

pub async fn handle(backend: &Backend, args: ExportArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let username = normalize_username(&args.username);

    let bar = util::spinner(&format!("Generating configs for {username}"), global.quiet);
    let result = backend.exporter().export(&username).await;
    bar.finish_and_clear();
    let bundle = result?;

    let report = ExportReport::from(&bundle);
    let out = output::render_single(
        global.output,
        &report,
        |r| {
            let mut text = format!(
                "Endpoint config: {}\nClient config:   {} ({})",
                r.endpoint_config, r.client_config, r.client_variant
            );
            if r.skip_verification {
                text.push_str("\nCertificate verification is disabled in the client config.");
            }
            text.push_str("\n\n");
            text.push_str(&format_profile(&bundle.profile));
            text
        },
        |r| format!("{}\n{}", r.endpoint_config, r.client_config),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
