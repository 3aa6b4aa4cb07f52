//! Aggregated tool catalog.
//!
//! The catalog is an immutable snapshot built from every ready session's
//! discovered tools. The session manager swaps in a new snapshot whenever
//! discovery completes or a session leaves the ready set; readers keep
//! whatever `Arc<ToolCatalog>` they already hold.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::server::LOCAL_OWNER;
use super::tool::ToolInfo;
use super::tool_name::{normalize, qualify};

/// One routable tool in the aggregated catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Globally unique name; also `tool.name`.
    pub qualified_name: String,
    pub owner_server_id: String,
    /// Name sent to the provider in `tools/call`.
    pub remote_name: String,
    /// Normalized form of `remote_name`, classified alongside the qualified name.
    pub canonical_remote_name: String,
    pub tool: ToolInfo,
}

/// A canonical name offered by more than one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCollision {
    /// The contested canonical name.
    pub name: String,
    /// Every owner offering it, `"local"` included when a built-in has it.
    pub owners: Vec<String>,
    /// Namespaced names the remote copies were published under.
    pub qualified_names: Vec<String>,
}

/// Immutable snapshot mapping qualified names to their owners.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: BTreeMap<String, CatalogEntry>,
    collisions: Vec<CatalogCollision>,
}

struct Candidate<'a> {
    server_id: &'a str,
    canonical: String,
    tool: &'a ToolInfo,
}

impl ToolCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from per-server tool lists.
    ///
    /// `reserved` holds canonical names owned by local built-ins. A canonical
    /// name offered by more than one owner, or equal to another tool's
    /// namespaced name, is published as `<serverId>.<name>` for every remote
    /// owner; uncontested names are published as-is. Every `<serverId>.x`
    /// entry is owned by `serverId`.
    pub fn build<'a, I>(servers: I, reserved: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [ToolInfo])>,
    {
        let mut servers: Vec<(&str, &[ToolInfo])> = servers.into_iter().collect();
        servers.sort_by(|a, b| a.0.cmp(b.0));

        let mut candidates = Vec::new();
        let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for name in reserved {
            owners
                .entry(name.clone())
                .or_default()
                .insert(LOCAL_OWNER.to_string());
        }

        for (server_id, tools) in servers {
            for tool in tools {
                let Some(canonical) = normalize(&tool.name) else {
                    tracing::warn!(server_id = %server_id, "Skipping tool with empty name");
                    continue;
                };
                owners
                    .entry(canonical.clone())
                    .or_default()
                    .insert(server_id.to_string());
                candidates.push(Candidate {
                    server_id,
                    canonical,
                    tool,
                });
            }
        }

        // A raw name that equals some namespaced name is contested as well;
        // namespacing it may in turn contest further raw names.
        let mut contested: BTreeSet<String> = owners
            .iter()
            .filter(|(_, set)| set.len() > 1)
            .map(|(name, _)| name.clone())
            .collect();
        loop {
            let namespaced: BTreeSet<String> = candidates
                .iter()
                .filter(|c| contested.contains(&c.canonical))
                .map(|c| qualify(c.server_id, &c.canonical))
                .collect();
            let newly: Vec<String> = candidates
                .iter()
                .filter(|c| !contested.contains(&c.canonical) && namespaced.contains(&c.canonical))
                .map(|c| c.canonical.clone())
                .collect();
            if newly.is_empty() {
                break;
            }
            contested.extend(newly);
        }

        let mut entries = BTreeMap::new();
        let mut published: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        // Namespaced names first so `<serverId>.x` always belongs to `serverId`
        let (namespaced, raw): (Vec<&Candidate<'_>>, Vec<&Candidate<'_>>) = candidates
            .iter()
            .partition(|c| contested.contains(&c.canonical));

        for (candidate, is_namespaced) in namespaced
            .into_iter()
            .map(|c| (c, true))
            .chain(raw.into_iter().map(|c| (c, false)))
        {
            let qualified = if is_namespaced {
                qualify(candidate.server_id, &candidate.canonical)
            } else {
                candidate.canonical.clone()
            };

            if entries.contains_key(&qualified) || reserved.contains(&qualified) {
                tracing::warn!(
                    server_id = %candidate.server_id,
                    tool = %candidate.tool.name,
                    qualified_name = %qualified,
                    "Dropping tool whose qualified name is already taken"
                );
                continue;
            }

            if is_namespaced {
                published
                    .entry(candidate.canonical.as_str())
                    .or_default()
                    .push(qualified.clone());
            }

            let mut tool = candidate.tool.clone();
            tool.name.clone_from(&qualified);
            tool.owner = candidate.server_id.to_string();

            entries.insert(
                qualified.clone(),
                CatalogEntry {
                    qualified_name: qualified,
                    owner_server_id: candidate.server_id.to_string(),
                    remote_name: candidate.tool.name.clone(),
                    canonical_remote_name: candidate.canonical.clone(),
                    tool,
                },
            );
        }

        let collisions: Vec<CatalogCollision> = owners
            .into_iter()
            .filter(|(name, _)| contested.contains(name))
            .map(|(name, set)| CatalogCollision {
                qualified_names: published.get(name.as_str()).cloned().unwrap_or_default(),
                owners: set.into_iter().collect(),
                name,
            })
            .collect();

        for collision in &collisions {
            tracing::warn!(
                tool = %collision.name,
                owners = ?collision.owners,
                published_as = ?collision.qualified_names,
                "Tool name offered by multiple owners; remote copies namespaced"
            );
        }

        Self {
            entries,
            collisions,
        }
    }

    pub fn get(&self, qualified_name: &str) -> Option<&CatalogEntry> {
        self.entries.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.entries.contains_key(qualified_name)
    }

    /// Entries in qualified-name order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> &[CatalogCollision] {
        &self.collisions
    }

    /// Number of published tools owned by `server_id`.
    pub fn tool_count_for(&self, server_id: &str) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.owner_server_id == server_id)
            .count()
    }
}
