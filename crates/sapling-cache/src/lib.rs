//! Caching tiers for Sapling: a bounded LRU+TTL memory cache, a SQLite
//! per-file cache keyed by fingerprint, and a hybrid of the two.

pub mod config;
pub mod disk;
pub mod error;
pub mod fingerprint;
pub mod hybrid;
pub mod memory;
pub mod policy;
pub mod size;


pub use config::{CacheConfig, PolicyOverride};
pub use disk::{DiskCache, DiskStats};
pub use error::{CacheError, CacheResult};
pub use fingerprint::{FULL_HASH_LIMIT, FileFingerprint, fingerprint_file};
pub use hybrid::{HybridCache, HybridStats};
pub use memory::{CacheStats, MemoryCache, MemoryCacheConfig};
pub use policy::{CachePolicy, EntityKind, PolicyRule, Priority};
pub use size::{SizeContext, SizeEstimate, estimate_size};
