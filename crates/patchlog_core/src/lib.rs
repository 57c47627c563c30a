//! Client-facing half of the patch-log engine: the line-log codec, the
//! trimmer, the patch applier, the incremental sync client, and the shared
//! configuration and error types they all build on.

pub mod apply;
pub mod codec;
pub mod config;
pub mod error;
pub mod http_cache;
pub mod sync;
pub mod trim;

pub use apply::{apply, apply_chain, select_chain, Patch};
pub use codec::{JlapReader, JlapWriter, RawLine};
pub use config::Config;
pub use error::{ApplyError, JlapError, SyncError};
pub use sync::{JlapSyncClient, SyncOutcome};
pub use trim::{trim, TrimOutcome};
