//! Per-kind caching rules

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Category of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    File,
    Node,
    Relationship,
    Query,
    Summary,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::File,
        EntityKind::Node,
        EntityKind::Relationship,
        EntityKind::Query,
        EntityKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Node => "node",
            EntityKind::Relationship => "relationship",
            EntityKind::Query => "query",
            EntityKind::Summary => "summary",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown cache entity kind: {s}"))
    }
}

/// Informational only; eviction does not consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ttl_days: u64,
    pub max_size_mb: f64,
    pub priority: Priority,
}

impl PolicyRule {
    pub const fn new(ttl_days: u64, max_size_mb: f64, priority: Priority) -> Self {
        PolicyRule {
            ttl_days,
            max_size_mb,
            priority,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(SECONDS_PER_DAY))
    }
}

const FILE_RULE: PolicyRule = PolicyRule::new(7, 10.0, Priority::High);

/// Rule table keyed by kind. A kind without a rule uses the file rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    rules: HashMap<EntityKind, PolicyRule>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert(EntityKind::File, FILE_RULE);
        rules.insert(EntityKind::Node, PolicyRule::new(3, 1.0, Priority::Medium));
        rules.insert(EntityKind::Relationship, PolicyRule::new(3, 1.0, Priority::Medium));
        rules.insert(EntityKind::Query, PolicyRule::new(1, 5.0, Priority::Low));
        rules.insert(EntityKind::Summary, PolicyRule::new(14, 1.0, Priority::Low));
        CachePolicy { rules }
    }
}

impl CachePolicy {
    /// A policy with no rules; every kind resolves to the file rule.
    pub fn empty() -> Self {
        CachePolicy { rules: HashMap::new() }
    }

    pub fn with_rule(mut self, kind: EntityKind, rule: PolicyRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn set_rule(&mut self, kind: EntityKind, rule: PolicyRule) {
        self.rules.insert(kind, rule);
    }

    pub fn rule(&self, kind: EntityKind) -> PolicyRule {
        self.rules
            .get(&kind)
            .or_else(|| self.rules.get(&EntityKind::File))
            .copied()
            .unwrap_or(FILE_RULE)
    }

    pub fn get_ttl_days(&self, kind: EntityKind) -> u64 {
        self.rule(kind).ttl_days
    }

    pub fn get_ttl(&self, kind: EntityKind) -> Duration {
        self.rule(kind).ttl()
    }

    pub fn get_max_size_mb(&self, kind: EntityKind) -> f64 {
        self.rule(kind).max_size_mb
    }

    pub fn should_cache(&self, kind: EntityKind, size_mb: f64) -> bool {
        size_mb <= self.get_max_size_mb(kind)
    }

    pub fn get_priority(&self, kind: EntityKind) -> Priority {
        self.rule(kind).priority
    }
}
