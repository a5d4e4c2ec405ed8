//! 编辑错误定义

use crate::edit::EditKind;
use crate::feature::{EditSequence, EntityTypeId, FeatureId, FeatureKind};
use crate::ids::IdError;
use crate::input::ParseError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Feature {0} does not exist")]
    MissingFeature(FeatureId),

    #[error("Feature {0} is not active")]
    InactiveFeature(FeatureId),

    #[error("Feature {feature} is not a {expected}")]
    WrongKind { feature: FeatureId, expected: FeatureKind },

    #[error("Unknown entity type {0:?}")]
    UnknownEntity(EntityTypeId),

    #[error("Entity type {entity:?} cannot be used for a {expected}")]
    WrongEntityKind { entity: EntityTypeId, expected: FeatureKind },

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("No solution")]
    NoSolution,

    #[error("Edit {0} does not exist")]
    UnknownEdit(EditSequence),

    #[error("Edit {0} is not the last edit of the current session")]
    NotTail(EditSequence),

    #[error("{0:?} edits cannot be corrected")]
    NotCorrectable(EditKind),

    #[error("Cannot change a {expected:?} edit into {found:?}")]
    KindChanged { expected: EditKind, found: EditKind },

    #[error("Correction would change the features created: {0}")]
    StructureChanged(String),

    #[error("Feature {feature} was created after edit {sequence}")]
    ForwardReference { feature: FeatureId, sequence: EditSequence },

    #[error("Dependent edit {sequence} failed: {source}")]
    RollForward {
        sequence: EditSequence,
        #[source]
        source: Box<EditError>,
    },

    #[error("Edit input could not be encoded: {0}")]
    Encoding(String),

    #[error("Identifier error: {0}")]
    Id(#[from] IdError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}
