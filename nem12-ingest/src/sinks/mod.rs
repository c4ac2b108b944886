pub mod json_store;
pub mod memory;
pub mod store;
pub mod year_batch;

pub use json_store::JsonDocumentStore;
pub use memory::MemoryStore;
pub use store::{DailyDocument, DailyStore, SiteDocument, StoreError, UpsertOutcome};
pub use year_batch::YearBatchSink;
