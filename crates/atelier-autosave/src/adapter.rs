//! Persistence adapter contract
//!
//! The content database is an external collaborator. Savers only need one
//! primitive from it: a partial update of named fields on one document, with
//! the store assigning the `updatedAt` timestamp itself.

use crate::error::AdapterError;
use crate::path::FieldPath;
use crate::types::DocumentRef;
use serde_json::Value;

/// Field the store stamps with its own clock on every partial update
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field carrying the editor id when one is configured
pub const UPDATED_BY_FIELD: &str = "updatedBy";

/// Partial update of one document
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    /// Fields (or dotted nested paths) and their new values
    pub fields: Vec<(FieldPath, Value)>,
    /// Editor id to record alongside the server timestamp
    pub updated_by: Option<String>,
}

impl PartialUpdate {
    /// Update a single field
    #[inline]
    #[must_use]
    pub fn field(path: FieldPath, value: Value) -> Self {
        Self {
            fields: vec![(path, value)],
            updated_by: None,
        }
    }

    /// With editor id
    #[inline]
    #[must_use]
    pub fn with_updated_by(mut self, user: Option<String>) -> Self {
        self.updated_by = user;
        self
    }

    /// Value written to `path`, if this update touches it
    #[must_use]
    pub fn value_of(&self, path: &FieldPath) -> Option<&Value> {
        self.fields.iter().find(|(p, _)| p == path).map(|(_, v)| v)
    }
}

/// Write side of the content store
///
/// Implementations must support dotted-path updates of nested object fields,
/// whole-field overwrite of arrays, and assign [`UPDATED_AT_FIELD`] from their
/// own clock.
#[async_trait::async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Apply a partial update to one document
    async fn partial_update(
        &self,
        document: &DocumentRef,
        update: PartialUpdate,
    ) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_of_finds_field() {
        let path = FieldPath::field("heroHeadline");
        let update = PartialUpdate::field(path.clone(), json!("Latex couture"));
        assert_eq!(update.value_of(&path), Some(&json!("Latex couture")));
        assert_eq!(update.value_of(&FieldPath::field("other")), None);
    }
}
