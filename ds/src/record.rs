//! Record trait implemented by every persisted type

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};

/// A document that can be stored in a [`crate::Store`]
pub trait Record: Serialize + DeserializeOwned {
    /// Unique id within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection (table partition) name
    fn collection_name() -> &'static str;
}

/// Current time in Unix milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
