//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`album`] - Album archive download
//! - [`system`] - Health

use serde::{Deserialize, Serialize};

mod album;
mod system;

pub use album::*;
pub use system::*;

/// Query parameters for GET /album/
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AlbumQuery {
    /// Album page to resolve
    #[serde(default)]
    pub url: Option<String>,
}
