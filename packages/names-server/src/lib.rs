//! names-server - serves the extracts produced by names-extract
//!
//! Only the newest date for which every category has a file is served, as
//! `/downloads/<category>.csv.gz`, with content-hash ETags.

pub mod error;
pub mod extract;
pub mod server;

pub use error::{Result, ServerError};
pub use extract::{list_extracts, Extract, Extracts, DEFAULT_CATEGORIES};
pub use server::{router, spawn_rescan, AppState};
