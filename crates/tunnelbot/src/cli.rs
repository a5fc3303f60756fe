//! Clap derive structures for the `tunnelbot` CLI.
//!
//! Defines the command tree, global flags, and shared types. Also compiled
//! by build.rs for man pages, so it depends on clap only.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tunnelbot -- Telegram admin panel for a TrustTunnel VPN endpoint
#[derive(Debug, Parser)]
#[command(
    name = "tunnelbot",
    version,
    about = "Administer a TrustTunnel VPN endpoint from Telegram or the command line",
    long_about = "Runs a Telegram bot that gives allow-listed admins a single-message\n\
        control panel for VPN accounts, access rules and client config export.\n\n\
        The same operations are available as non-interactive subcommands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to bot.toml (default: ./bot.toml, then the platform config dir)
    #[arg(long, short = 'c', env = "TUNNELBOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Telegram bot
    Run(RunArgs),

    /// Manage VPN accounts
    #[command(alias = "u")]
    Users(UsersArgs),

    /// Manage endpoint access rules
    #[command(alias = "r")]
    Rules(RulesArgs),

    /// Generate endpoint and client configs for a user
    Export(ExportArgs),

    /// Make the endpoint pick up the current stores
    Reconcile,

    /// Inspect configuration and store the bot token
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List accounts
    #[command(alias = "ls")]
    List,

    /// Add an account
    Add {
        /// Username (a leading @ is stripped)
        username: String,

        /// Password to set (prompted for when neither flag is given)
        #[arg(long, conflicts_with = "generate")]
        password: Option<String>,

        /// Generate a random password
        #[arg(long, short = 'g')]
        generate: bool,
    },

    /// Delete an account
    #[command(alias = "rm")]
    Delete {
        username: String,
    },
}

// ── Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// List rules in precedence order
    #[command(alias = "ls")]
    List,

    /// Append a rule: `<cidr> [prefix=<hex>] <allow|deny> [# label]`
    Add {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        rule: Vec<String>,
    },

    /// Remove a rule by position (as listed) or selector
    #[command(alias = "rm")]
    Remove {
        /// `3`, `10.0.0.0/8` or `prefix=aa`
        matcher: String,
    },

    /// Replace a rule in place
    Replace {
        /// `3`, `10.0.0.0/8` or `prefix=aa`
        matcher: String,

        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        rule: Vec<String>,
    },
}

// ── Export ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub username: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved config file path
    Path,

    /// Print the effective configuration (secrets masked)
    Show,

    /// Store the bot token in the system keyring
    SetToken,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
