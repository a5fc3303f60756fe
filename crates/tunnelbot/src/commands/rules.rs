//! `tunnelbot rules` handlers.

use tabled::Tabled;

use tunnelbot_core::{Backend, Rule, RuleMatcher, format_summary, parse_rule};

use crate::cli::{GlobalOpts, OutputFormat, RulesArgs, RulesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "CIDR")]
    cidr: String,
    #[tabled(rename = "Client random prefix")]
    prefix: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Label")]
    label: String,
}

pub async fn handle(backend: &Backend, args: RulesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = backend.rules()?;
    match args.command {
        RulesCommand::List => {
            let rules = registry.list_rules().await?;
            let out = if matches!(global.output, OutputFormat::Plain) {
                format_summary(&rules).collect::<Vec<_>>().join("\n")
            } else {
                let mut position = 0;
                output::render_list(
                    global.output,
                    &rules,
                    |r| {
                        position += 1;
                        to_row(position, r)
                    },
                    ToString::to_string,
                )?
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RulesCommand::Add { rule } => {
            let rule = parse_rule(&rule.join(" "))?;
            let change = registry.append_rule(rule).await?;
            util::settle(&format!("Rule added: {}", change.rule), change.outcome, global)
        }

        RulesCommand::Remove { matcher } => {
            let matcher = RuleMatcher::parse(&matcher)?;
            if !util::confirm(
                &format!("Remove the rule at {matcher}?"),
                "rules remove",
                global.yes,
            )? {
                return Ok(());
            }
            let change = registry.remove_rule(&matcher).await?;
            util::settle(&format!("Rule removed: {}", change.rule), change.outcome, global)
        }

        RulesCommand::Replace { matcher, rule } => {
            let matcher = RuleMatcher::parse(&matcher)?;
            let rule = parse_rule(&rule.join(" "))?;
            let replacement = rule.to_string();
            let change = registry.replace_rule(&matcher, rule).await?;
            util::settle(
                &format!("Rule replaced: {} -> {replacement}", change.rule),
                change.outcome,
                global,
            )
        }
    }
}

fn to_row(position: usize, rule: &Rule) -> RuleRow {
    RuleRow {
        position,
        cidr: rule.cidr.clone().unwrap_or_default(),
        prefix: rule.client_random_prefix.clone().unwrap_or_default(),
        action: rule.action.to_string(),
        label: rule.label.clone().unwrap_or_default(),
    }
}
