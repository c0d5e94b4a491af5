use std::sync::Arc;

use thiserror::Error;

// Errors reported by object storage backends and the artifact fetch flows built
// on top of them. The cache layer treats every one of these as grounds for a
// negative-cache entry - they all mean "we could not get the bytes".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found at {0}")]
    NotFound(String),
    #[error("failed to find source file at {0}")]
    FailedToFindSourceFile(String),
    #[error("failed to find source map location in {0}")]
    FailedToFindSourceMapLocation(String),
    #[error("failed to find source map at {0}")]
    FailedToFindSourceMap(String),
    #[error("storage transport error: {0}")]
    Transport(String),
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// The underlying reason a fetch-classified symbolication failure happened.
// Kept separate from SymbolicationError so the expensive-to-clone store error
// can sit behind an Arc - fetch failures get cloned into the per-record memo
// table and re-returned for every frame sharing the same artifact key.
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timed out waiting for the symbolication gate")]
    GateTimeout,
    #[error("artifact previously failed to fetch")]
    KnownMissing,
}

#[derive(Debug, Error, Clone)]
pub enum SymbolicationError {
    #[error("failed to fetch debug artifact {key}: {cause}")]
    Fetch { key: String, cause: Arc<FetchCause> },
    #[error("failed to parse debug artifact: {0}")]
    Parse(String),
    #[error("line number {0} outside valid range")]
    InvalidLine(i64),
    #[error("column number {0} outside valid range")]
    InvalidColumn(i64),
    #[error("no mapping for {0}:{1}:{2}")]
    TokenNotFound(String, u32, u32),
}

impl SymbolicationError {
    pub fn fetch(key: impl Into<String>, cause: FetchCause) -> Self {
        SymbolicationError::Fetch {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }

    // Fetch-classified failures are the only ones worth remembering - they're
    // negative-cached by the loader and memoized per record. Callers must use
    // this rather than matching on the rendered message.
    pub fn is_fetch(&self) -> bool {
        matches!(self, SymbolicationError::Fetch { .. })
    }
}

// Failures from the raw stack-trace parsers. These surface to users through
// the record's error attribute, so the messages are written for humans.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackParseError {
    #[error("empty stack trace")]
    EmptyStackTrace,
    #[error("stack trace did not start with an exception header")]
    InvalidStackTrace,
    #[error("no frames parsed from stack trace")]
    NoFramesParsed,
}

// Record-level failures. These never propagate out of the processor - they
// degrade into attributes on the record, which is always emitted.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("missing structured stack trace attributes; {0} attribute is missing")]
    MissingAttribute(String),
    #[error("missing structured stack trace attributes; {0}")]
    StackUnparseable(#[from] StackParseError),
    #[error("mismatched structured stack trace attribute lengths: {0}")]
    MismatchedLength(String),
}
