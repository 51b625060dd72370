//! Atelier Autosave - per-field debounced persistence for the content admin
//!
//! Every editable field of an admin page gets its own saver that:
//! - Treats the value loaded from the store as its saved baseline
//! - Debounces edits and writes a partial update of just that field
//! - Publishes `idle | dirty | saving | saved | error` for the UI
//! - Keeps write failures local, with a manual retry
//!
//! # Core Concepts
//!
//! - [`PersistenceAdapter`]: the content store's partial-update primitive
//! - [`FieldSaver`]: debounced autosave of one field or dotted nested path
//! - [`ArrayField`] / [`ArrayItemSaver`]: item edits of array-valued fields,
//!   written back as the whole array
//! - [`StatusIndicator`]: status to UI affordance mapping
//! - [`UnsavedChangesGuard`]: warns before leaving a page with pending edits
//! - [`ImagePipeline`]: select, edit, confirm, upload flow for image fields
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_autosave::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let binding = FieldBinding::new("siteContent", "main", FieldPath::field("heroHeadline"));
//! let saver = FieldSaver::bind(store, binding, "Hello".to_string(), &AutosaveConfig::new());
//!
//! saver.set_value("Hello world".to_string());
//! assert_eq!(saver.status(), SaveStatus::Dirty);
//! saver.flush().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod adapter;
pub mod array;
pub mod error;
pub mod field_saver;
pub mod guard;
pub mod image_pipeline;
pub mod indicator;
pub mod memory;
pub mod path;
mod saver;
pub mod types;

// Re-exports for convenience
pub use adapter::{PartialUpdate, PersistenceAdapter, UPDATED_AT_FIELD, UPDATED_BY_FIELD};
pub use array::{ArrayField, ArrayItemSaver};
pub use error::{AdapterError, ConfigError, PathError, PipelineError, SaveError};
pub use field_saver::{is_dirty, FieldSaver};
pub use guard::{has_unsaved, UnsavedChangesGuard, DEFAULT_WARNING};
pub use image_pipeline::{
    ai_image_path, decode_image_data, generate_image_path, ImageCategory, ImagePipeline,
    ImageStore, PipelineStatus, ProgressFn,
};
pub use indicator::{Affordance, IndicatorAction, StatusIndicator};
pub use memory::{DocumentChange, MemoryStore};
pub use path::FieldPath;
pub use saver::{Autosave, FieldValue};
pub use types::{AutosaveConfig, DocumentRef, FieldBinding, SaveSnapshot, SaveStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for binding savers on an admin page
    pub use crate::{
        ArrayField, ArrayItemSaver, Autosave, AutosaveConfig, DocumentRef, FieldBinding,
        FieldPath, FieldSaver, MemoryStore, PersistenceAdapter, SaveStatus, StatusIndicator,
        UnsavedChangesGuard,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
