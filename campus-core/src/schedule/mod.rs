pub mod error;
pub mod ingest;
pub mod models;
pub mod store;

pub use error::{IngestError, StoreError, StoreResult};
pub use ingest::{parse_export, RawEvent};
pub use models::{ExecutionOutcome, ResultRow, ScheduleEntry, SqlPolicy};
pub use store::{ScheduleStore, ScheduleStoreBuilder};
