//! CFI error types
//!
//! Parse-time failures are reported as [`CfiParseError`] (a malformed CFI);
//! everything that can go wrong once a CFI meets a structural tree, or
//! another CFI, is a [`CfiError`].

use thiserror::Error;

/// What was wrong with a malformed CFI string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty CFI string")]
    Empty,

    #[error("CFI must start with 'epubcfi('")]
    MissingPrefix,

    #[error("CFI must end with ')'")]
    MissingClosingParen,

    #[error("expected '/' step")]
    ExpectedStep,

    #[error("expected number")]
    ExpectedNumber,

    #[error("step index must be positive")]
    NonPositiveIndex,

    #[error("indirection on the terminal step")]
    TerminalIndirection,

    #[error("unclosed assertion bracket")]
    UnclosedBracket,

    #[error("invalid assertion")]
    InvalidAssertion,

    #[error("invalid temporal offset")]
    InvalidTemporalOffset,

    #[error("invalid spatial offset")]
    InvalidSpatialOffset,

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("range sub-paths must not both be empty")]
    EmptyRange,

    #[error("offset on a range prefix")]
    OffsetBeforeRange,

    #[error("range end comes before its start")]
    InvertedRange,

    #[error("range start and end cross different documents")]
    IncomparableRange,
}

/// A malformed CFI: carries the failure kind, the byte position and the
/// offending substring starting at that position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed CFI at position {position}: {kind} (near '{fragment}')")]
pub struct CfiParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
    pub fragment: String,
}

impl CfiParseError {
    pub(crate) fn new(kind: ParseErrorKind, input: &str, position: usize) -> Self {
        let position = position.min(input.len());
        let fragment: String = input
            .get(position..)
            .unwrap_or_default()
            .chars()
            .take(24)
            .collect();
        Self {
            kind,
            position,
            fragment,
        }
    }
}

/// Errors raised while constructing, comparing or resolving CFIs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfiError {
    #[error(transparent)]
    Malformed(#[from] CfiParseError),

    /// A path needs at least one step
    #[error("CFI path has no steps")]
    EmptyPath,

    /// The last step of a path crosses into another document, leaving
    /// nothing to address there
    #[error("indirection on the final step {step}")]
    TerminalIndirection { step: usize },

    /// A range prefix carrying its own terminal offset
    #[error("range prefix {prefix} ends in an offset")]
    OffsetBeforeRange { prefix: String },

    /// A 0-based position too large for CFI's even/odd indexing
    #[error("position {position} has no CFI index")]
    IndexOverflow { position: u32 },

    /// Range construction with end before start
    #[error("range end {end} comes before start {start}")]
    InvertedRange { start: String, end: String },

    /// The two paths address different documents
    #[error("CFIs are not comparable: they cross different documents at step {step}")]
    Incomparable { step: usize },

    /// Structural index does not exist at this level
    #[error("node not found at step {step} ({rendered}): highest index at this level is {available}")]
    NodeNotFound {
        step: usize,
        rendered: String,
        available: usize,
    },

    /// The located node does not carry the asserted id
    #[error("id assertion failed at step {step}: expected '{expected}', found {found:?}")]
    AssertionMismatch {
        step: usize,
        expected: String,
        found: Option<String>,
    },

    /// The terminal character offset exceeds the node's text length
    #[error("offset {offset} out of range at step {step}: text length is {length}")]
    OffsetOutOfRange {
        step: usize,
        offset: u32,
        length: usize,
    },
}

/// Result alias for CFI operations
pub type Result<T> = std::result::Result<T, CfiError>;
