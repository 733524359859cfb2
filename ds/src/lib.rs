//! DispatchStore - JSON records on SQLite
//!
//! Each record is a serde document stored under `(collection, id)`.
//! Besides plain CRUD the store offers guarded, targeted updates
//! (`update_fields`, `replace_where`) that touch a single row and report
//! how many rows they affected. Callers use the row count to detect lost
//! races instead of reading, modifying and writing back a whole record.

mod filter;
mod record;
mod store;

pub use filter::{Filter, FilterOp, IndexValue};
pub use record::{Record, now_ms};
pub use store::Store;
