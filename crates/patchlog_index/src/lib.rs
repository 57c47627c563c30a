//! Publish-side half of the patch-log engine: the diff generator, the
//! SQLite patch store, and the publisher that regenerates JLAPs from them.

pub mod diff;
pub mod error;
pub mod filesystem_source;
pub mod publish;
pub mod store;

pub use diff::{diff as diff_revisions, DiffOutcome};
pub use error::{DiffError, PublishError, StoreError};
pub use filesystem_source::{default_history_dir, FileHistorySource};
pub use publish::{publish, Revision, RevisionSource};
pub use store::{PatchStore, StoredPatch};
