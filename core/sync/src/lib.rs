//! Bidirectional synchronization between local workspace tables and the
//! upstream ERP.
//!
//! - [`mapper`] / [`mappers`]: per-entity field translation and query
//!   construction, customers through vendor bills.
//! - [`pull`]: one SuiteQL query per entity, applied row by row with
//!   per-record failure isolation.
//! - [`push`]: pending local edits sent through the record API with
//!   idempotent creates and a bounded retry budget.
//! - [`conflict`]: strategy-driven resolution when both sides changed.
//! - [`engine`]: run-log bracketing, delta watermarks, and manual conflict
//!   resolution over the two halves.
//! - [`scheduler`]: manual or periodic driving of whole passes.
//!
//! Persistence stays behind the [`store`] traits; [`memory`] provides the
//! in-process implementations used by the CLI and tests.

pub mod conflict;
pub mod engine;
pub mod mapper;
pub mod mappers;
pub mod memory;
pub mod metadata;
pub mod pull;
pub mod push;
pub mod runlog;
pub mod scheduler;
pub mod store;

pub use conflict::{resolve, ConflictStrategy, Resolution, ResolutionDecision};
pub use engine::{ConflictChoice, FullSyncReport, SyncConfig, SyncEngine};
pub use mapper::EntityMapper;
pub use mappers::{
    CustomerMapper, InvoiceMapper, ProjectMapper, VendorBillMapper, VendorMapper,
};
pub use memory::{MemoryLocalStore, MemoryMetadataStore, MemoryRunLogStore};
pub use metadata::{ConflictPayload, SyncMetadata, SyncStatus};
pub use pull::{pull_delta, PullReport, RecordError};
pub use push::{push_pending, PushReport, PUSH_MAX_RETRIES};
pub use runlog::{RunStatus, SyncDirection, SyncRunLog, SyncType};
pub use scheduler::{ScheduleMode, SchedulerTask, SyncScheduler, SyncSummary};
pub use store::{LocalRecordStore, MetadataStore, RunLogStore};
