//! Error types for model description parsing.

/// Errors that stop tokenization before any model is built.
///
/// Everything past tokenization (unknown enumeration values, unresolved
/// aliases, bad dependency indices) is reported as a diagnostic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// The document is not well-formed XML.
    #[error("malformed model description at byte {position}: {detail}")]
    Malformed {
        /// Byte offset where the tokenizer gave up.
        position: u64,
        /// Description of the problem.
        detail: String,
    },
}

/// Result type for XML operations.
pub type Result<T> = std::result::Result<T, XmlError>;
