//! # Till Engine
//!
//! The deterministic core of the Till offline-first POS sync engine.
//!
//! A terminal keeps selling while disconnected; this crate decides, given
//! the local and remote copy of a record, what reconciliation should do —
//! without performing any of it. All IO (SQLite, HTTP, timers) lives in
//! `till-terminal`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of databases, network, or time
//! - **Deterministic**: the same record pair always classifies and merges
//!   the same way
//! - **Closed entity set**: sync logic dispatches on [`EntityKind`], never
//!   on free-form table names
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! Both sides of the wire are normalized into [`RecordData`]: identity,
//! epoch-millisecond timestamps, and a JSON payload of business fields.
//! Local rows additionally carry a [`SyncStatus`] tag.
//!
//! ### Diffing and classification
//!
//! [`diff_records`] compares payloads field by field with typed equality
//! from the kind's catalog. [`classify`] turns a record pair into a
//! [`Disposition`]: identical, deterministically ordered, or a
//! [`Conflict`] tagged with a severity derived from the most sensitive
//! differing field. The comparison windows are configurable via
//! [`SyncWindows`].
//!
//! ### Merging
//!
//! [`merge_fields`] combines a conflicting pair field by field: magnitude
//! numerics take the max, dates the later instant, booleans OR, text keeps
//! the non-empty side.
//!
//! ### Change log and watermarks
//!
//! [`ChangeLogEntry`] models the append-only audit trail and conflict
//! inbox; [`Watermarks`] is the per-table monotonic pull cursor.

pub mod changelog;
pub mod conflict;
pub mod diff;
pub mod entity;
pub mod error;
pub mod merge;
pub mod record;
pub mod report;
pub mod watermark;

// Re-export main types at crate root
pub use changelog::{ChangeLogEntry, ConflictDetail, EntryStatus, SyncOperation};
pub use conflict::{classify, severity, Conflict, ConflictType, Disposition, SyncWindows};
pub use diff::{diff_records, values_equal, FieldDiff};
pub use entity::{EntityKind, FieldType, Impact};
pub use error::Error;
pub use merge::merge_fields;
pub use record::{RecordData, SyncStatus};
pub use report::{CycleReport, RecordError, SyncReport, TableReport};
pub use watermark::Watermarks;

pub use error::Result;

/// Epoch milliseconds.
pub type Timestamp = i64;
