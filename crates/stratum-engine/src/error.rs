//! Engine error types
//!
//! Only unrecoverable conditions are raised as errors. Lookup misses,
//! duplicate declarations and depth-guard trips are reported through
//! `Lookup` results and the diagnostics sink instead.

use stratum_sdk::SdkError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised to the immediate caller
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Type lookup failed
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// Property lookup on an instance failed
    #[error("Property '{property}' not found on {type_name}")]
    PropertyNotFound {
        /// Type searched
        type_name: String,
        /// Property name
        property: String,
    },

    /// Value rejected by the property's declared type
    #[error("Property {type_name}.{property} expects {expected}, got {actual}")]
    TypeMismatch {
        /// Type owning the property
        type_name: String,
        /// Property name
        property: String,
        /// Declared type
        expected: String,
        /// Kind of the rejected value
        actual: String,
    },

    /// A non-dynamic type has no usable compiled class
    #[error("No compiled class for non-dynamic type {0}")]
    NoCompiledClass(String),

    /// No constructor accepts the given arguments
    #[error("No constructor of {type_name} accepts {arity} argument(s)")]
    ConstructorNotFound {
        /// Type being constructed
        type_name: String,
        /// Number of arguments supplied
        arity: usize,
    },

    /// Declaration cannot be used as requested
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Initializer evaluation failed
    #[error("Initializer for {type_name}.{field} failed: {message}")]
    Initializer {
        /// Type owning the initializer
        type_name: String,
        /// Field being initialized
        field: String,
        /// Failure message
        message: String,
    },

    /// Stub generation or artifact store failure
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Error from a collaborator
    #[error(transparent)]
    Sdk(#[from] SdkError),
}
