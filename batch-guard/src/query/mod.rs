//! Store queries: extra conditions, the backend seam and its implementations.

mod condition;
mod recording;
mod store;

pub use condition::{strip_slashes, Condition, ConditionSet};
pub use recording::{QueryKind, QueryRecord, RecordingStore};
pub use store::{
    json_rows_to_batch, DataFusionStore, StoreBackend, StoreConfig, StoreQuery,
};
