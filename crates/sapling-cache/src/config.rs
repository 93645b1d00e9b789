//! `[cache]` configuration section

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::memory::{BYTES_PER_MB, MemoryCacheConfig};
use crate::policy::{CachePolicy, EntityKind, PolicyRule, Priority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory tier capacity
    pub memory_max_mb: f64,
    /// Background sweep period; 0 disables the sweep thread
    pub cleanup_interval_secs: u64,
    /// Entries unread for this long are dropped
    pub access_ttl_hours: u64,
    /// Per-kind overrides, keyed by kind name (`file`, `node`, ...)
    pub policy: BTreeMap<String, PolicyOverride>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            memory_max_mb: 100.0,
            cleanup_interval_secs: 300,
            access_ttl_hours: 24,
            policy: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub ttl_days: Option<u64>,
    pub max_size_mb: Option<f64>,
    pub priority: Option<Priority>,
}

impl CacheConfig {
    pub fn validate(&self) -> CacheResult<()> {
        if self.memory_max_mb.is_nan() || self.memory_max_mb <= 0.0 {
            return Err(CacheError::InvalidConfig(format!(
                "memory_max_mb must be positive, got {}",
                self.memory_max_mb
            )));
        }
        for (kind, rule) in &self.policy {
            if rule.max_size_mb.is_some_and(|mb| mb < 0.0) {
                return Err(CacheError::InvalidConfig(format!("negative max_size_mb for {kind}")));
            }
        }
        Ok(())
    }

    pub fn memory(&self) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_size_bytes: (self.memory_max_mb * BYTES_PER_MB) as usize,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            access_ttl: Duration::from_secs(self.access_ttl_hours.saturating_mul(60 * 60)),
        }
    }

    /// Default table with configured overrides applied. Unknown kind names are ignored.
    pub fn policy(&self) -> CachePolicy {
        let mut policy = CachePolicy::default();
        for (name, update) in &self.policy {
            let kind = match name.parse::<EntityKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("Ignoring cache policy override: {}", e);
                    continue;
                }
            };
            let base = policy.rule(kind);
            policy.set_rule(
                kind,
                PolicyRule {
                    ttl_days: update.ttl_days.unwrap_or(base.ttl_days),
                    max_size_mb: update.max_size_mb.unwrap_or(base.max_size_mb),
                    priority: update.priority.unwrap_or(base.priority),
                },
            );
        }
        policy
    }
}
