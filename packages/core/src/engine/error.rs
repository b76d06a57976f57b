//! Error types for the classification engine

use thiserror::Error;

/// Caller contract violations. Classification itself never fails on
/// well-formed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("No alerting state for entity {entity_id} of {parent_id}")]
    UnknownEntity { parent_id: String, entity_id: String },

    #[error("Entity {entity_id} of {parent_id} does not track era state")]
    EraTrackingDisabled { parent_id: String, entity_id: String },
}

impl EngineError {
    pub fn unknown_entity(parent_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::UnknownEntity {
            parent_id: parent_id.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn era_tracking_disabled(
        parent_id: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::EraTrackingDisabled {
            parent_id: parent_id.into(),
            entity_id: entity_id.into(),
        }
    }
}
