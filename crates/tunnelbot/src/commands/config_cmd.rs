//! Config subcommand handlers.

use tunnelbot_config::{resolve_config_path, store_token};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = resolve_config_path(global.config.as_deref());
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let loaded = config::load(global)?;
            let shown = loaded.config.redacted();
            let as_toml = |c: &tunnelbot_config::BotConfig| {
                toml::to_string_pretty(c).unwrap_or_else(|e| format!("# unrenderable: {e}"))
            };
            let mut out = output::render_single(global.output, &shown, as_toml, as_toml)?;
            if matches!(global.output, OutputFormat::Table) {
                out = format!("# {}\n{out}", loaded.path.display());
            }
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken => {
            let token = rpassword::prompt_password("Bot token: ")?;
            let token = token.trim();
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "bot token cannot be empty".into(),
                });
            }
            store_token(token)?;
            output::status("Bot token stored in system keyring", true, global.color, global.quiet);
            Ok(())
        }
    }
}
