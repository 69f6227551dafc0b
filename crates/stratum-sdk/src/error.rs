//! Error types for the Stratum SDK

/// Result type for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;

/// SDK error types
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Unknown layer referenced by an ordering query
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// Slot index outside the instance layout
    #[error("Slot index {index} out of bounds (instance has {len} slots)")]
    SlotOutOfBounds {
        /// Requested slot
        index: usize,
        /// Number of slots in the instance
        len: usize,
    },

    /// Artifact store IO error
    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact index (de)serialization error
    #[error("Artifact index error: {0}")]
    Index(#[from] serde_json::Error),
}
