// tunnelbot-core: stores, reconciliation and the chat panel between the
// outbound clients (tunnelbot-api) and the binary.

pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod panel;
pub mod process;
pub mod reconcile;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::Backend;
pub use config::{EndpointSettings, ReconcileConfig, ServiceConfig, StorePaths};
pub use error::CoreError;
pub use export::{
    ClientConfig, ClientVariant, ConnectionProfile, EndpointArtifact, EndpointExporter, ExportBundle,
    build_connection_profile, format_profile,
};
pub use reconcile::{ReconcileOutcome, Reconciler, Strategy};
pub use store::{
    Account, CredentialRegistry, Rule, RuleAction, RuleChange, RuleMatcher, RuleRegistry,
    StoreRecord, StructuredStore, UserChange, format_summary, generate_password, parse_rule,
};
