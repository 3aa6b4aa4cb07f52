//! Confirmation policy.
//!
//! Classifies canonical tool names into risk classes. The rule table is
//! plain static data so it can be printed and audited; classification is a
//! pure function of the table and the name.
//!
//! Resolution order:
//!
//! 1. exact rule match
//! 2. longest prefix rule match
//! 3. mutating-verb heuristic over the name's words
//! 4. `Safe`

use serde::{Deserialize, Serialize};

use super::tool_name::{canonical_separators, words};

/// Risk class of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Read-only or otherwise side-effect free.
    Safe,
    /// Must not run without explicit user consent.
    RequiresConfirmation,
}

impl RiskClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::RequiresConfirmation => "requires_confirmation",
        }
    }

    #[must_use]
    pub const fn requires_confirmation(self) -> bool {
        matches!(self, Self::RequiresConfirmation)
    }
}

impl std::fmt::Display for RiskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule pattern is compared to a canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Prefix,
}

/// A single row of the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRule {
    /// Canonical name (exact) or canonical name prefix.
    pub pattern: String,
    #[serde(rename = "match")]
    pub match_kind: MatchKind,
    pub risk: RiskClass,
}

impl ConfirmationRule {
    pub fn exact(pattern: impl Into<String>, risk: RiskClass) -> Self {
        Self {
            pattern: pattern.into(),
            match_kind: MatchKind::Exact,
            risk,
        }
    }

    pub fn prefix(pattern: impl Into<String>, risk: RiskClass) -> Self {
        Self {
            pattern: pattern.into(),
            match_kind: MatchKind::Prefix,
            risk,
        }
    }

    /// Normalize the pattern the same way tool names are normalized.
    ///
    /// A trailing separator on a prefix pattern is kept so `fs.` does not
    /// match `fsck`.
    fn normalized(&self) -> Self {
        let mut pattern = canonical_separators(&self.pattern);
        if self.match_kind == MatchKind::Prefix
            && self.pattern.trim_end().ends_with(['.', '_', '/', ':'])
            && !pattern.is_empty()
        {
            pattern.push('.');
        }
        Self {
            pattern,
            match_kind: self.match_kind,
            risk: self.risk,
        }
    }
}

use MatchKind::{Exact, Prefix};
use RiskClass::{RequiresConfirmation, Safe};

/// Built-in rule table: `(pattern, match, risk)`.
pub const DEFAULT_RULES: &[(&str, MatchKind, RiskClass)] = &[
    // filesystem: reads are safe, everything else mutates
    ("fs.readFile", Exact, Safe),
    ("fs.listDir", Exact, Safe),
    ("fs.stat", Exact, Safe),
    ("fs.search", Exact, Safe),
    ("fs.", Prefix, RequiresConfirmation),
    // process and shell execution
    ("shell.", Prefix, RequiresConfirmation),
    ("process.", Prefix, RequiresConfirmation),
    ("devo.exec.", Prefix, RequiresConfirmation),
    ("devo.exec", Exact, RequiresConfirmation),
    // version control writes
    ("git.status", Exact, Safe),
    ("git.diff", Exact, Safe),
    ("git.log", Exact, Safe),
    ("git.", Prefix, RequiresConfirmation),
    // outbound messages and network mutations
    ("http.post", Exact, RequiresConfirmation),
    ("http.put", Exact, RequiresConfirmation),
    ("http.delete", Exact, RequiresConfirmation),
    ("email.", Prefix, RequiresConfirmation),
    ("slack.send", Prefix, RequiresConfirmation),
    // known read-only built-ins
    ("time.now", Exact, Safe),
    ("echo", Exact, Safe),
];

/// Words that mark a tool as side-effecting when no rule matches.
pub const MUTATING_VERBS: &[&str] = &[
    "write", "edit", "create", "update", "upsert", "delete", "remove", "rm", "move", "rename",
    "copy", "exec", "execute", "run", "spawn", "start", "stop", "kill", "restart", "install",
    "uninstall", "push", "commit", "merge", "deploy", "send", "post", "put", "patch", "drop",
    "truncate", "insert", "set", "modify", "apply", "publish", "upload", "terminate", "shutdown",
    "reset", "revert", "overwrite", "append", "chmod", "chown", "mkdir", "format", "purge",
    "save", "add", "destroy", "clear", "transfer", "unlink", "empty", "erase", "wipe", "cancel",
    "close", "assign", "unassign", "grant", "revoke", "pay", "approve", "reject", "archive",
    "disable", "enable", "ban", "refund", "charge", "submit", "import", "restore", "rollback",
];

/// The confirmation policy: an ordered rule table plus the verb heuristic.
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    rules: Vec<ConfirmationRule>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(pattern, match_kind, risk)| ConfirmationRule {
                    pattern: (*pattern).to_string(),
                    match_kind: *match_kind,
                    risk: *risk,
                })
                .collect(),
        )
    }
}

impl ConfirmationPolicy {
    /// Create a policy from an explicit rule table.
    pub fn new(rules: Vec<ConfirmationRule>) -> Self {
        Self {
            rules: rules.iter().map(ConfirmationRule::normalized).collect(),
        }
    }

    /// The default table extended with extra rules (e.g. from configuration).
    ///
    /// Extra exact rules override default exact rules for the same name.
    #[must_use]
    pub fn with_rules(mut self, extra: Vec<ConfirmationRule>) -> Self {
        let extra: Vec<ConfirmationRule> = extra.iter().map(ConfirmationRule::normalized).collect();
        self.rules.retain(|rule| {
            !extra
                .iter()
                .any(|e| e.match_kind == rule.match_kind && e.pattern == rule.pattern)
        });
        self.rules.extend(extra);
        self
    }

    /// The effective rule table, for auditing.
    pub fn rules(&self) -> &[ConfirmationRule] {
        &self.rules
    }

    /// Classify a canonical tool name.
    pub fn classify(&self, canonical: &str) -> RiskClass {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.match_kind == MatchKind::Exact && rule.pattern == canonical)
        {
            return rule.risk;
        }

        if let Some(rule) = self
            .rules
            .iter()
            .filter(|rule| {
                rule.match_kind == MatchKind::Prefix && canonical.starts_with(rule.pattern.as_str())
            })
            .max_by_key(|rule| rule.pattern.len())
        {
            return rule.risk;
        }

        if has_mutating_verb(canonical) {
            RequiresConfirmation
        } else {
            Safe
        }
    }

    /// Classify every name a tool is known under and keep the strictest verdict.
    pub fn classify_all<'a, I>(&self, names: I) -> RiskClass
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|name| self.classify(name))
            .max()
            .unwrap_or(Safe)
    }
}

/// Whether any word of the canonical name is a mutating verb.
pub fn has_mutating_verb(canonical: &str) -> bool {
    words(canonical)
        .iter()
        .any(|word| MUTATING_VERBS.contains(&word.as_str()))
}
