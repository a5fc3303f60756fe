// ── Rule registry ──
//
// Ordered `[[rule]]` entries; the endpoint applies the first rule whose
// selectors match a connection, so position is meaningful and preserved.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::info;

use super::document::{StoreRecord, StructuredStore};
use crate::error::CoreError;
use crate::reconcile::{ReconcileOutcome, Reconciler};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RuleAction {
    Allow,
    Deny,
}

/// One access rule. At least one selector is set on rules the registry
/// writes; rules found on disk are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_random_prefix: Option<String>,
    pub action: RuleAction,
    /// Free-form note for admins; the endpoint ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Rule {
    pub fn new(cidr: Option<&str>, client_random_prefix: Option<&str>, action: RuleAction) -> Self {
        Self {
            cidr: cidr.map(str::to_owned),
            client_random_prefix: client_random_prefix.map(str::to_owned),
            action,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn cidr(&self) -> Option<&str> {
        self.cidr.as_deref().filter(|c| !c.is_empty())
    }

    fn prefix(&self) -> Option<&str> {
        self.client_random_prefix.as_deref().filter(|p| !p.is_empty())
    }

    /// Shape check for rules about to be written.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.cidr().is_none() && self.prefix().is_none() {
            return Err(CoreError::validation(
                "a rule needs a CIDR, a client random prefix, or both",
            ));
        }
        if let Some(cidr) = self.cidr() {
            validate_cidr(cidr).map_err(CoreError::validation)?;
        }
        if let Some(prefix) = self.prefix() {
            validate_prefix(prefix).map_err(CoreError::validation)?;
        }
        Ok(())
    }
}

impl StoreRecord for Rule {
    const TABLE: &'static str = "rule";
}

/// `10.0.0.0/8 prefix=aabb deny # office`, `any allow` for a rule
/// without selectors.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.cidr(), self.prefix()) {
            (Some(cidr), Some(prefix)) => write!(f, "{cidr} prefix={prefix} {}", self.action)?,
            (Some(cidr), None) => write!(f, "{cidr} {}", self.action)?,
            (None, Some(prefix)) => write!(f, "prefix={prefix} {}", self.action)?,
            (None, None) => write!(f, "any {}", self.action)?,
        }
        match self.label.as_deref().filter(|l| !l.is_empty()) {
            Some(label) => write!(f, " # {label}"),
            None => Ok(()),
        }
    }
}

fn validate_cidr(text: &str) -> Result<(), String> {
    let Some((addr, len)) = text.split_once('/') else {
        return Err(format!("'{text}' is not a CIDR block (expected address/prefix)"));
    };
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| format!("'{addr}' is not an IP address"))?;
    let len: u8 = len
        .parse()
        .map_err(|_| format!("'{len}' is not a prefix length"))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if len > max {
        return Err(format!("prefix length {len} exceeds {max}"));
    }
    Ok(())
}

// Hex prefix of the TLS client random, optionally `prefix/mask`.
fn validate_prefix(text: &str) -> Result<(), String> {
    let hex_part = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    let valid = match text.split_once('/') {
        Some((prefix, mask)) => hex_part(prefix) && hex_part(mask),
        None => hex_part(text),
    };
    if valid {
        Ok(())
    } else {
        Err(format!("'{text}' is not a hex client random prefix"))
    }
}

/// Parse `<cidr> [prefix=<hex>] <allow|deny>` or `prefix=<hex> <allow|deny>`,
/// optionally followed by `# label`.
pub fn parse_rule(text: &str) -> Result<Rule, CoreError> {
    let (body, label) = match text.split_once('#') {
        Some((body, label)) => (body, Some(label.trim()).filter(|l| !l.is_empty())),
        None => (text, None),
    };
    let mut tokens: Vec<&str> = body.split_whitespace().collect();
    let Some(last) = tokens.pop() else {
        return Err(CoreError::validation(
            "expected '<cidr> [prefix=<hex>] <allow|deny>'",
        ));
    };
    let action: RuleAction = last.parse().map_err(|_| {
        CoreError::validation(format!("'{last}' is not an action; use allow or deny"))
    })?;

    let (cidr, prefix) = parse_selectors(&tokens)?;
    let mut rule = Rule::new(cidr, prefix, action);
    rule.label = label.map(str::to_owned);
    rule.check()?;
    Ok(rule)
}

fn parse_selectors<'a>(tokens: &[&'a str]) -> Result<(Option<&'a str>, Option<&'a str>), CoreError> {
    let mut cidr = None;
    let mut prefix = None;
    for &token in tokens {
        let (slot, value, what) = match token.strip_prefix("prefix=") {
            Some(value) => (&mut prefix, value, "prefix"),
            None => (&mut cidr, token, "CIDR"),
        };
        if slot.replace(value).is_some() {
            return Err(CoreError::validation(format!("more than one {what} given")));
        }
    }
    Ok((cidr, prefix))
}

/// Which rule an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatcher {
    /// 1-based position in file order.
    Position(usize),
    /// First rule whose selectors equal these exactly.
    Selector {
        cidr: Option<String>,
        client_random_prefix: Option<String>,
    },
    /// The rule at a 1-based position, but only while it still equals
    /// `rule`. Used when the position was read in an earlier request.
    Exact { position: usize, rule: Rule },
}

impl RuleMatcher {
    /// `3` selects by position; anything else is read as selectors,
    /// e.g. `10.0.0.0/8` or `10.0.0.0/8 prefix=aa`.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        if let Ok(position) = text.parse::<usize>() {
            return Ok(Self::Position(position));
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let (cidr, prefix) = parse_selectors(&tokens)?;
        if cidr.is_none() && prefix.is_none() {
            return Err(CoreError::validation("expected a rule position or selector"));
        }
        Ok(Self::Selector {
            cidr: cidr.map(str::to_owned),
            client_random_prefix: prefix.map(str::to_owned),
        })
    }

    fn find(&self, rules: &[Rule]) -> Option<usize> {
        match self {
            Self::Position(pos) => pos.checked_sub(1).filter(|idx| *idx < rules.len()),
            Self::Selector {
                cidr,
                client_random_prefix,
            } => rules.iter().position(|r| {
                r.cidr() == cidr.as_deref() && r.prefix() == client_random_prefix.as_deref()
            }),
            Self::Exact { position, rule } => position
                .checked_sub(1)
                .filter(|idx| rules.get(*idx) == Some(rule)),
        }
    }
}

impl fmt::Display for RuleMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(pos) => write!(f, "position {pos}"),
            Self::Selector {
                cidr,
                client_random_prefix,
            } => {
                let mut parts = Vec::new();
                if let Some(c) = cidr {
                    parts.push(format!("cidr={c}"));
                }
                if let Some(p) = client_random_prefix {
                    parts.push(format!("prefix={p}"));
                }
                write!(f, "{}", parts.join(" "))
            }
            Self::Exact { position, rule } => write!(f, "rule #{position} ({rule})"),
        }
    }
}

/// One line per rule, in file order. Call again to iterate again.
pub fn format_summary(rules: &[Rule]) -> impl Iterator<Item = String> + '_ {
    rules.iter().map(ToString::to_string)
}

/// Result of a committed rule change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleChange {
    /// The rule added, removed or replaced (the old one for replace).
    pub rule: Rule,
    pub path: PathBuf,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone)]
pub struct RuleRegistry {
    store: StructuredStore<Rule>,
    reconciler: Reconciler,
}

impl RuleRegistry {
    pub fn new(store: StructuredStore<Rule>, reconciler: Reconciler) -> Self {
        Self { store, reconciler }
    }

    pub fn store(&self) -> &StructuredStore<Rule> {
        &self.store
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>, CoreError> {
        self.store.load().await
    }

    /// Add a rule at the end, where it has the lowest precedence.
    pub async fn append_rule(&self, rule: Rule) -> Result<RuleChange, CoreError> {
        rule.check()?;
        let added = rule.clone();
        self.store
            .with_lock(move |rules| {
                rules.push(rule);
                Ok(())
            })
            .await?;

        info!(rule = %added, "rule appended");
        Ok(self.committed(added).await)
    }

    /// Remove the first rule the matcher selects.
    pub async fn remove_rule(&self, matcher: &RuleMatcher) -> Result<RuleChange, CoreError> {
        let lookup = matcher.clone();
        let removed = self
            .store
            .with_lock(move |rules| {
                let idx = lookup.find(rules).ok_or_else(|| CoreError::RuleNotFound {
                    matcher: lookup.to_string(),
                })?;
                Ok(rules.remove(idx))
            })
            .await?;

        info!(rule = %removed, %matcher, "rule removed");
        Ok(self.committed(removed).await)
    }

    /// Swap the first matching rule for `rule`, keeping its position.
    pub async fn replace_rule(
        &self,
        matcher: &RuleMatcher,
        rule: Rule,
    ) -> Result<RuleChange, CoreError> {
        rule.check()?;
        let lookup = matcher.clone();
        let replaced = self
            .store
            .with_lock(move |rules| {
                let idx = lookup.find(rules).ok_or_else(|| CoreError::RuleNotFound {
                    matcher: lookup.to_string(),
                })?;
                Ok(std::mem::replace(&mut rules[idx], rule))
            })
            .await?;

        info!(old = %replaced, %matcher, "rule replaced");
        Ok(self.committed(replaced).await)
    }

    async fn committed(&self, rule: Rule) -> RuleChange {
        RuleChange {
            rule,
            path: self.store.path().to_path_buf(),
            outcome: self.reconciler.reconcile().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn allow(cidr: &str) -> Rule {
        Rule::new(Some(cidr), None, RuleAction::Allow)
    }

    #[test]
    fn parses_cidr_rule() {
        assert_eq!(parse_rule("10.3.2.1/32 allow").unwrap(), allow("10.3.2.1/32"));
    }

    #[test]
    fn parses_prefix_only_rule() {
        let rule = parse_rule("prefix=aabbcc DENY").unwrap();
        assert_eq!(rule, Rule::new(None, Some("aabbcc"), RuleAction::Deny));
    }

    #[test]
    fn parses_both_selectors() {
        let rule = parse_rule("2001:db8::/32 prefix=ff/f0 deny").unwrap();
        assert_eq!(rule.cidr.as_deref(), Some("2001:db8::/32"));
        assert_eq!(rule.client_random_prefix.as_deref(), Some("ff/f0"));
    }

    #[test]
    fn label_follows_hash() {
        let rule = parse_rule("10.0.0.0/8 deny # office lan").unwrap();
        assert_eq!(rule, Rule::new(Some("10.0.0.0/8"), None, RuleAction::Deny).with_label("office lan"));
        assert_eq!(rule.to_string(), "10.0.0.0/8 deny # office lan");
    }

    #[test]
    fn rejects_malformed_rules() {
        for bad in [
            "",
            "allow",
            "10.0.0.0/8",
            "10.0.0.0/8 maybe",
            "10.0.0.0/33 allow",
            "10.0.0.1 allow",
            "prefix=xyz allow",
            "10.0.0.0/8 10.1.0.0/16 allow",
        ] {
            assert!(parse_rule(bad).is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn summary_lines_follow_file_order() {
        let rules = vec![
            allow("10.3.2.1/32"),
            Rule::new(None, Some("aabb"), RuleAction::Deny),
            Rule::new(Some("0.0.0.0/0"), Some("cc"), RuleAction::Deny),
        ];
        let lines: Vec<String> = format_summary(&rules).collect();
        assert_eq!(
            lines,
            [
                "10.3.2.1/32 allow",
                "prefix=aabb deny",
                "0.0.0.0/0 prefix=cc deny"
            ]
        );
        assert_eq!(format_summary(&rules).count(), 3);
    }

    #[test]
    fn matcher_by_position_is_one_based() {
        let rules = vec![allow("10.0.0.0/8"), allow("10.1.0.0/16")];
        assert_eq!(RuleMatcher::Position(2).find(&rules), Some(1));
        assert_eq!(RuleMatcher::Position(0).find(&rules), None);
        assert_eq!(RuleMatcher::Position(3).find(&rules), None);
    }

    #[test]
    fn matcher_by_selector_takes_first_exact_match() {
        let rules = vec![
            Rule::new(Some("10.0.0.0/8"), Some("aa"), RuleAction::Allow),
            allow("10.0.0.0/8"),
            Rule::new(Some("10.0.0.0/8"), None, RuleAction::Deny),
        ];
        let matcher = RuleMatcher::parse("10.0.0.0/8").unwrap();
        assert_eq!(matcher.find(&rules), Some(1));
    }

    #[test]
    fn exact_matcher_needs_the_same_rule_in_place() {
        let rules = vec![allow("10.0.0.0/8"), allow("10.1.0.0/16")];
        let matcher = RuleMatcher::Exact {
            position: 2,
            rule: allow("10.1.0.0/16"),
        };
        assert_eq!(matcher.find(&rules), Some(1));

        let shifted = vec![allow("10.1.0.0/16"), allow("10.2.0.0/16")];
        assert_eq!(matcher.find(&shifted), None);
        assert_eq!(matcher.to_string(), "rule #2 (10.1.0.0/16 allow)");
    }

    #[test]
    fn matcher_parse_reads_positions_and_selectors() {
        assert_eq!(RuleMatcher::parse(" 4 ").unwrap(), RuleMatcher::Position(4));
        assert_eq!(
            RuleMatcher::parse("prefix=aa").unwrap(),
            RuleMatcher::Selector {
                cidr: None,
                client_random_prefix: Some("aa".into())
            }
        );
        assert!(RuleMatcher::parse("").is_err());
    }

    #[test]
    fn serialized_rule_omits_absent_selectors() {
        let text = toml::to_string(&Rule::new(None, Some("aa"), RuleAction::Deny)).unwrap();
        assert_eq!(text, "client_random_prefix = \"aa\"\naction = \"deny\"\n");
    }
}
