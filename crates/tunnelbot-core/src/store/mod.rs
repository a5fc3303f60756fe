// ── Shared file-backed stores ──
//
// Small TOML documents that the endpoint service reads on its own
// schedule. Every read-modify-write runs under an exclusive lock and every
// write is an atomic rename, so the endpoint never sees a torn file.

mod credentials;
mod document;
mod lock;
mod rules;

pub use credentials::{
    Account, CredentialRegistry, UserChange, generate_password, normalize_username,
    validate_username,
};
pub use document::{StoreRecord, StructuredStore};
pub use rules::{
    Rule, RuleAction, RuleChange, RuleMatcher, RuleRegistry, format_summary, parse_rule,
};

pub(crate) use document::write_atomic;
