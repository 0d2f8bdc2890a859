//! Runtime error taxonomy.
//!
//! Every recoverable failure in compilation, interpretation, or the call
//! gateway is a [`RunError`]: a kind, a message, and an optional
//! source-position prefix recovered from the offending instruction object.
//! Errors unwind out of the interpreter loop to the current `call_fun`
//! caller via `Result`.

use std::fmt;

/// Classification of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A basic block with an empty `instrs` array reached the compiler.
    EmptyBlock,
    /// The compiler met an `op` string it does not lower.
    UnknownOpcode,
    /// A named field was absent from an object.
    MissingField,
    /// `set_field` with a name that is not a valid identifier.
    InvalidFieldName,
    /// String or array indexed access outside its bounds.
    IndexOutOfBounds,
    /// Call-site argument count does not match the callee's parameters.
    ArgCount,
    /// Fewer operands on the stack than a call consumes.
    StackUnderflow,
    /// Stack size after a top-level call differs from before it.
    StackImbalance,
    /// Call target is neither a function object nor a host function.
    InvalidCallee,
    /// Package has no export under the requested name.
    MissingExport,
    /// The requested export is not a function object.
    ExportNotFunction,
    /// The code heap's fixed capacity is exhausted.
    CodeHeapExhausted,
    /// The value stack's fixed capacity is exhausted.
    StackOverflow,
    /// A typed pop met a value of the wrong tag.
    TypeMismatch,
    /// A throw unwound past the top-level frame without a catch block.
    UncaughtException,
    /// The importer does not know the requested package.
    UnknownPackage,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::EmptyBlock => "empty block",
            ErrorKind::UnknownOpcode => "unknown opcode",
            ErrorKind::MissingField => "missing field",
            ErrorKind::InvalidFieldName => "invalid field name",
            ErrorKind::IndexOutOfBounds => "index out of bounds",
            ErrorKind::ArgCount => "argument count mismatch",
            ErrorKind::StackUnderflow => "stack underflow",
            ErrorKind::StackImbalance => "stack imbalance",
            ErrorKind::InvalidCallee => "invalid callee",
            ErrorKind::MissingExport => "missing export",
            ErrorKind::ExportNotFunction => "export not a function",
            ErrorKind::CodeHeapExhausted => "code heap exhausted",
            ErrorKind::StackOverflow => "stack overflow",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::UncaughtException => "uncaught exception",
            ErrorKind::UnknownPackage => "unknown package",
        }
    }
}

/// A recoverable runtime failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    kind: ErrorKind,
    message: String,
    src_pos: Option<String>,
}

/// Convenience alias used across the VM crates.
pub type RunResult<T> = Result<T, RunError>;

impl RunError {
    /// Create an error with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> RunError {
        RunError {
            kind,
            message: message.into(),
            src_pos: None,
        }
    }

    /// Attach a rendered source position.
    pub fn with_pos(mut self, pos: Option<String>) -> RunError {
        self.src_pos = pos;
        self
    }

    /// The failure classification.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The bare message, without position prefix.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The rendered source position, when one was recovered.
    #[inline]
    pub fn src_pos(&self) -> Option<&str> {
        self.src_pos.as_deref()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = &self.src_pos {
            write!(f, "{} - ", pos)?;
        }
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for RunError {}
