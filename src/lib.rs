//! Mistake book: a subject-organized repository of mistake-question images
//! with sidecar notes, search, statistics, backups and document export.

pub mod error;
pub mod export;
pub mod imaging;
pub mod jobs;
pub mod ops;
pub mod service;
pub mod state;

pub use error::{Error, Result};
pub use jobs::{JobEvent, JobHandle, JobKind, JobOutput};
pub use service::{Command, CropRegion, Outcome, Paths, RepositoryService};
pub use state::config::{Config, ExportFormat};
pub use state::data::{Entry, EntryKind, MetadataRecord};
