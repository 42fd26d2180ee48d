//! Exceptions raised inside a running variant.

use thiserror::Error;

/// Exception kinds the engine can raise or a variant can name in `except`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Exception,
    ValueError,
    TypeError,
    LookupError,
    KeyError,
    IndexError,
    OSError,
    FileNotFoundError,
    ZeroDivisionError,
    AttributeError,
    NameError,
    RuntimeError,
    AssertionError,
    ImportError,
    SyntaxError,
    ToolError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Exception => "Exception",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::LookupError => "LookupError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::OSError => "OSError",
            ErrorKind::FileNotFoundError => "FileNotFoundError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::NameError => "NameError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::AssertionError => "AssertionError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ToolError => "ToolError",
        }
    }

    /// Direct base kind, `None` for the root.
    fn parent(&self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Exception => None,
            ErrorKind::KeyError | ErrorKind::IndexError => Some(ErrorKind::LookupError),
            ErrorKind::FileNotFoundError => Some(ErrorKind::OSError),
            _ => Some(ErrorKind::Exception),
        }
    }

    /// True when an `except <other>` clause would catch this kind.
    pub fn is_a(&self, other: ErrorKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raised exception: kind plus message.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    pub fn os_error(err: &std::io::Error, path: &str) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::FileNotFoundError
        } else {
            ErrorKind::OSError
        };
        Self::new(kind, format!("{}: '{}'", err, path))
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_catches_everything() {
        assert!(ErrorKind::KeyError.is_a(ErrorKind::Exception));
        assert!(ErrorKind::ToolError.is_a(ErrorKind::Exception));
        assert!(ErrorKind::FileNotFoundError.is_a(ErrorKind::OSError));
        assert!(!ErrorKind::ValueError.is_a(ErrorKind::TypeError));
    }

    #[test]
    fn test_display_is_kind_and_message() {
        let err = ScriptError::value_error("bad input");
        assert_eq!(err.to_string(), "ValueError: bad input");
    }
}
