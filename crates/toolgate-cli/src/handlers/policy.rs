//! Policy and classify command handlers.

use anyhow::Result;
use toolgate_core::{ConfirmationPolicy, MatchKind, RiskClass, tool_name};

use crate::presentation::{print_separator, truncate_string};

/// One classified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub requested: String,
    /// `None` when the name normalizes to nothing.
    pub canonical: Option<String>,
    pub risk: RiskClass,
}

/// Normalize and classify each name.
///
/// Unusable names are reported as requiring confirmation, the same answer
/// the gateway gives for any name it cannot prove safe.
pub fn classify(policy: &ConfirmationPolicy, names: &[String]) -> Vec<Classification> {
    names
        .iter()
        .map(|requested| {
            let canonical = tool_name::normalize(requested);
            let risk = canonical
                .as_deref()
                .map_or(RiskClass::RequiresConfirmation, |c| policy.classify(c));
            Classification {
                requested: requested.clone(),
                canonical,
                risk,
            }
        })
        .collect()
}

/// Print the rule table.
pub fn execute(policy: &ConfirmationPolicy) -> Result<()> {
    println!("{:<36} {:<8} Risk", "Pattern", "Match");
    print_separator(70);
    for rule in policy.rules() {
        let kind = match rule.match_kind {
            MatchKind::Exact => "exact",
            MatchKind::Prefix => "prefix",
        };
        println!(
            "{:<36} {:<8} {}",
            truncate_string(&rule.pattern, 35),
            kind,
            rule.risk.as_str()
        );
    }
    println!();
    println!("Names matching no rule are safe unless they contain a mutating verb.");
    Ok(())
}

/// Print the classification of each name.
pub fn execute_classify(policy: &ConfirmationPolicy, names: &[String]) -> Result<()> {
    for row in classify(policy, names) {
        match row.canonical {
            Some(canonical) => {
                println!("{:<32} {:<32} {}", row.requested, canonical, row.risk.as_str());
            }
            None => println!("{:<32} {:<32} invalid name", row.requested, "-"),
        }
    }
    Ok(())
}
