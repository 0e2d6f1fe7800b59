//! The pool's error taxonomy (spec §7).
//!
//! One variant per named error kind. Grouped here by the spec's headings;
//! the grouping is documentation only, `PoolError` is a single flat enum so
//! that every public operation can return one `PoolResult<T>`.

use crate::ids::ElementId;
use crate::elements::ElementType;

/// Result alias used by every public operation in this crate.
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    // --- Lookup ---------------------------------------------------------
    #[error("no element with id {0}")]
    NotFound(ElementId),

    #[error("no element named {0:?}")]
    NotFoundByName(String),

    #[error("element {id} is a {actual:?}, not a {expected:?}")]
    WrongType {
        id: ElementId,
        expected: ElementType,
        actual: ElementType,
    },

    #[error("name {0:?} matches more than one element")]
    AmbiguousName(String),

    // --- Configuration ---------------------------------------------------
    #[error("property {property:?} of {instance:?} has no value and no default")]
    MissingProperty { instance: String, property: String },

    #[error("property {property:?} of {instance:?} expected type {expected}, got {actual:?}")]
    TypePropertyMismatch {
        instance: String,
        property: String,
        expected: &'static str,
        actual: String,
    },

    #[error("declared default for property {property:?} does not parse as {expected}")]
    InvalidPropertyDefault {
        property: String,
        expected: &'static str,
    },

    #[error("property {0:?} declares an unknown type {1:?}")]
    UnknownPropertyType(String, String),

    // --- Loader -----------------------------------------------------------
    #[error("no controller file matching {0:?} found on the search path")]
    ControllerFileNotFound(String),

    #[error("failed to load controller file {file:?}: {reason}")]
    LoadFailure { file: String, reason: String },

    #[error("class {class:?} in {file:?} is missing required symbol {symbol:?}")]
    ClassMissingRequiredSymbol {
        file: String,
        class: String,
        symbol: &'static str,
    },

    #[error("extra attribute {0:?} has an invalid declaration")]
    InvalidExtraAttributeDecl(String),

    // --- Lifecycle --------------------------------------------------------
    #[error("an element named {0:?} already exists")]
    ElementExists(String),

    #[error("an element with id {0} already exists")]
    ElementIDExists(ElementId),

    #[error("parent instrument {0:?} does not exist")]
    ParentInstrumentMissing(String),

    #[error("instrument name {0:?} must start with '/'")]
    InvalidInstrumentName(String),

    #[error("{0:?} does not name a valid instrument type")]
    InvalidInstrumentType(String),

    #[error("element {0} is referenced by a pseudo-motor, group or measurement group and cannot be deleted")]
    ElementInUse(ElementId),

    // --- Operation ----------------------------------------------------------
    #[error("element {0} is moving; reload/delete refused")]
    BusyMoving(ElementId),

    #[error("axis {axis} is out of range for controller {ctrl} (MaxDevice exceeded)")]
    AxisOutOfRange { ctrl: ElementId, axis: i32 },

    #[error("element {0} is in a state that does not permit this operation")]
    BadState(ElementId),

    #[error("move produces conflicting targets for motor {0}")]
    AmbiguousMove(ElementId),

    #[error("operation not supported by this controller/element")]
    OperationNotSupported,

    #[error("unknown extra-attribute or parameter {0:?}")]
    UnknownProperty(String),

    // --- Plug-in --------------------------------------------------------------
    #[error("plug-in error ({description}): {source}")]
    PlugInError {
        description: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PoolError {
    /// Wrap an arbitrary plug-in failure, carrying the plug-in's own
    /// description string as required by spec §7's propagation policy.
    pub fn plugin(
        description: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PoolError::PlugInError {
            description: description.into(),
            source: Box::new(source),
        }
    }
}
