use thiserror::Error;

/// Errors raised by address, block and set operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed textual input.
    #[error("parse error: {0}")]
    Parse(String),
    /// A value or prefix length outside its valid bounds.
    #[error("out of range: {0}")]
    Range(String),
    /// IPv4 and IPv6 operands were mixed.
    #[error("address family mismatch: {0} vs {1}")]
    VersionMismatch(crate::Version, crate::Version),
    /// Positional access past the end of a block.
    #[error("index out of range: {0}")]
    Index(String),
    /// Removal of address space that the set does not hold.
    #[error("key not found: {0}")]
    Key(String),
    /// Invalid argument, such as a zero range step.
    #[error("invalid value: {0}")]
    Value(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn parse_err<S: Into<String>>(msg: S) -> Error {
    Error::Parse(msg.into())
}

pub(crate) fn range_err<S: Into<String>>(msg: S) -> Error {
    Error::Range(msg.into())
}
