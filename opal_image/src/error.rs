//! Image parsing errors.

use std::fmt;

/// A failure while reading or resolving a program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageError {
    /// 1-based source line, 0 for file-level failures.
    pub line: u32,
    /// 1-based source column, 0 for file-level failures.
    pub col: u32,
    pub message: String,
}

impl ImageError {
    pub fn new(line: u32, col: u32, message: impl Into<String>) -> ImageError {
        ImageError {
            line,
            col,
            message: message.into(),
        }
    }

    /// A failure not tied to a source position (I/O, missing root).
    pub fn file(message: impl Into<String>) -> ImageError {
        ImageError::new(0, 0, message)
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}:{}: {}", self.line, self.col, self.message)
        }
    }
}

impl std::error::Error for ImageError {}
