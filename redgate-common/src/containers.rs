//! Hot-path container aliases used by dispatch and scheduler state.
//!
//! Command lookup and per-batch conflict tracking sit on the request hot path. This module keeps
//! container choices centralized so future allocator/container upgrades can be done in one place
//! without touching dispatch or scheduler modules.

use hashbrown::{HashMap as HbMap, HashSet as HbSet};

/// Hot-path hash map used by the command table and backend store.
pub type HotMap<K, V> = HbMap<K, V>;

/// Hot-path hash set used by per-batch used-key tracking.
pub type HotSet<T> = HbSet<T>;
