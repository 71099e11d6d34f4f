//! Core library for generating CSS sprites.
//!
//! - Layout: elements sorted by squareness, then packed into rows bounded by the widest element
//! - Pipeline: intake → layout → composite (PNG) → stylesheet, one run per sprite group
//! - Watch: generated sprites stay registered in a dependency-tracked cache and are rebuilt
//!   when a source or output file changes
//!
//! Quick example:
//! ```ignore
//! use spritegen_core::prelude::*;
//! # fn main() -> spritegen_core::Result<()> {
//! let cfg = SpriteConfig::builder()
//!     .root("wwwroot")
//!     .group(
//!         GroupConfig::new("icons", "~/img/icons.png", "~/css/icons.css")
//!             .with_image("home", "~/img/icons/home.png")
//!             .with_image("search", "~/img/icons/search.png"),
//!     )
//!     .build();
//! let service = SpriteService::with_file_watch(cfg)?;
//! service.start()?;
//! // ... serve requests ...
//! service.stop();
//! # Ok(()) }
//! ```

pub mod compositing;
pub mod config;
pub mod error;
pub mod generator;
pub mod intake;
pub mod io;
pub mod model;
pub mod packer;
pub mod pipeline;
pub mod service;
pub mod stylesheet;
pub mod watch;

pub use config::*;
pub use error::*;
pub use generator::*;
pub use model::*;
pub use pipeline::*;
pub use service::*;

/// Convenience prelude for common types and functions.
/// Importing `spritegen_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{
        DirectoryRule, GroupConfig, ImageEntry, RetryConfig, SpriteConfig, SpriteConfigBuilder,
    };
    pub use crate::generator::{GenerationOutput, GeneratorOptions, SpriteGenerator};
    pub use crate::io::{
        FileReader, FileWriter, PathResolver, RetryPolicy, RetryingFileStore, RootedPathResolver,
    };
    pub use crate::model::{
        CompositeKey, GenerationRecord, ImageDescriptor, Rect, SheetStats, SpriteElement,
    };
    pub use crate::packer::{Packer, RowFillPacker, layout_elements};
    pub use crate::pipeline::{SpriteSheet, build_from_descriptors, build_sprite};
    pub use crate::service::{SpriteService, group_record};
    pub use crate::watch::{
        CacheEntry, DependencyCache, Expiration, FileWatchCache, Priority, RemovalReason,
        WatchOutcome,
    };
}
