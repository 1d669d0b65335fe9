//! Backend-neutral session tuning.

use serde::{Deserialize, Serialize};

/// Pass-through configuration applied when a connection core opens.
///
/// On the embedded backend these become pragmas; on the client/server
/// backend they become session `SET`s where an equivalent exists, and
/// are otherwise skipped with a debug log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Page-cache budget in kilobytes.
    pub cache_size_kb: Option<i64>,
    /// Take exclusive ownership of the database.
    pub exclusive: bool,
    /// Trade durability for write speed by disabling synchronous flushes.
    pub force_sync_off: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size_kb: None,
            exclusive: false,
            force_sync_off: false,
        }
    }
}
