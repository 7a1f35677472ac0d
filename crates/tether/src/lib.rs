//! ## Crate layout
//! - `config`: mapper configuration and its TOML loader.
//! - `core`: entity models, the mapper, sessions, caches and references.
//!
//! The `prelude` module carries what record definitions and session code
//! need; stores, codecs and observability stay under `core`.

pub use tether_config as config;
pub use tether_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::{db::MemoryStore, error::MappingError as Error};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db::{EntitySet, ReferenceField as _},
        prelude::*,
    };
}
