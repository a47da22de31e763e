//! Crate-wide error type.
//!
//! A single [`RenderError`] enum carries the taxonomy of spec §7 (VMError,
//! LimitCheck, RangeCheck, TypeCheck, SyntaxError, UndefinedFilename,
//! InvalidFileAccess, IOError, InvalidAccess, Undefined) plus the engine's
//! historical negative status-code space exposed through [`RenderError::code`]
//! and the human-readable status string through [`RenderError::status_str`].
//! These replace the original implementation's error-message table indexed by
//! negative codes.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RenderError>;

/// The one error type for the whole crate.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Allocation / bookkeeping failure, fatal to the current operation and
    /// always propagated (e.g. loop-detector budget exhausted).
    #[error("VMerror")]
    VmError,

    /// A size or bound was violated (oversized filename, malformed box length,
    /// short read).
    #[error("limitcheck: {0}")]
    LimitCheck(String),

    /// An out-of-range enum or numeric value.
    #[error("rangecheck: {0}")]
    RangeCheck(String),

    /// Wrong PDF object type where a specific type was required.
    #[error("typecheck: expected {expected}, got {got}")]
    TypeCheck {
        expected: &'static str,
        got: &'static str,
    },

    /// Malformed embedded binary structure (e.g. JPEG2000 box framing).
    #[error("syntaxerror: {0}")]
    SyntaxError(String),

    /// A required object or name was not defined.
    #[error("undefined: {0}")]
    Undefined(String),

    /// An output filename was missing or invalid.
    #[error("undefinedfilename: {0}")]
    UndefinedFilename(String),

    /// A file could not be opened, sought, or written.
    #[error("invalidfileaccess: {0}")]
    InvalidFileAccess(String),

    /// Attempt to change a locked parameter, or device used while not open.
    #[error("invalidaccess: {0}")]
    InvalidAccess(String),

    /// Operand stack was empty when a value was required.
    #[error("stackunderflow")]
    StackUnderflow,

    /// A stream filter failed to decode its data.
    #[error("decodeerror: {0}")]
    DecodeError(String),

    /// Underlying file I/O failure.
    #[error("ioerror: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// The engine's historical negative status code for this error kind.
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidFileAccess(_) => -9,
            Self::InvalidAccess(_) => -7,
            Self::LimitCheck(_) => -12,
            Self::Io(_) => -13,
            Self::DecodeError(_) => -13,
            Self::RangeCheck(_) => -15,
            Self::TypeCheck { .. } => -20,
            Self::Undefined(_) => -21,
            Self::UndefinedFilename(_) => -22,
            Self::StackUnderflow => -23,
            Self::VmError => -25,
            Self::SyntaxError(_) => -26,
        }
    }

    /// The human-readable status string for this error kind.
    pub const fn status_str(&self) -> &'static str {
        match self {
            Self::InvalidFileAccess(_) => "invalidfileaccess",
            Self::InvalidAccess(_) => "invalidaccess",
            Self::LimitCheck(_) => "limitcheck",
            Self::Io(_) => "ioerror",
            Self::DecodeError(_) => "decodeerror",
            Self::RangeCheck(_) => "rangecheck",
            Self::TypeCheck { .. } => "typecheck",
            Self::Undefined(_) => "undefined",
            Self::UndefinedFilename(_) => "undefinedfilename",
            Self::StackUnderflow => "stackunderflow",
            Self::VmError => "VMerror",
            Self::SyntaxError(_) => "syntaxerror",
        }
    }
}
