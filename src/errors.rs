use std::fmt;

pub type Result<T> = std::result::Result<T, LockGraphError>;

/// Which layer of processing a failure was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorLayer {
    /// Reading from or writing to a caller-supplied stream failed.
    Stream,
    /// The outermost base64 text of a dump was malformed.
    Base64,
    /// The compressed stream inside a dump was truncated or corrupt.
    Compression,
    /// The JSON did not have the shape of a graph.
    Encoding,
    /// The JSON decoded, but the resulting graph breaks its own invariants
    /// (parallel edge arrays of different lengths, dangling node ids, string
    /// indexes outside of the stack table).
    Structure,
    /// A report configuration file could not be read or parsed.
    Config,
    /// User input like an edge id was malformed.
    BadInput,
}

/// Payload describing what went wrong for investigation purposes.
#[derive(Debug)]
pub struct ErrorDetails {
    pub layer: ErrorLayer,
    /// Stringified version of the lower level error.
    pub message: String,
}

#[derive(Debug)]
pub enum LockGraphError {
    /// Reading or writing a stream failed.
    Io(ErrorDetails),
    /// A dump could not be turned back into a graph.  There is no partial
    /// recovery; callers never see a half-decoded graph.
    Decode(ErrorDetails),
    BadInput(ErrorDetails),
}

impl LockGraphError {
    pub fn details(&self) -> &ErrorDetails {
        match self {
            LockGraphError::Io(d) | LockGraphError::Decode(d) | LockGraphError::BadInput(d) => d,
        }
    }

    pub fn layer(&self) -> ErrorLayer {
        self.details().layer
    }

    pub(crate) fn decode(layer: ErrorLayer, message: impl Into<String>) -> Self {
        LockGraphError::Decode(ErrorDetails {
            layer,
            message: message.into(),
        })
    }

    pub(crate) fn bad_input(message: impl Into<String>) -> Self {
        LockGraphError::BadInput(ErrorDetails {
            layer: ErrorLayer::BadInput,
            message: message.into(),
        })
    }
}

impl fmt::Display for LockGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, details) = match self {
            LockGraphError::Io(d) => ("I/O error", d),
            LockGraphError::Decode(d) => ("decode error", d),
            LockGraphError::BadInput(d) => ("bad input", d),
        };
        write!(f, "{} ({:?}): {}", kind, details.layer, details.message)
    }
}

impl std::error::Error for LockGraphError {}

/// Raw I/O errors with no better context are stream problems.
impl From<std::io::Error> for LockGraphError {
    fn from(err: std::io::Error) -> LockGraphError {
        LockGraphError::Io(ErrorDetails {
            layer: ErrorLayer::Stream,
            message: err.to_string(),
        })
    }
}

// JSON errors outside of `load` are encoding problems.
impl From<serde_json::Error> for LockGraphError {
    fn from(err: serde_json::Error) -> LockGraphError {
        LockGraphError::Decode(ErrorDetails {
            layer: ErrorLayer::Encoding,
            message: err.to_string(),
        })
    }
}

impl From<toml::de::Error> for LockGraphError {
    fn from(err: toml::de::Error) -> LockGraphError {
        LockGraphError::Decode(ErrorDetails {
            layer: ErrorLayer::Config,
            message: err.to_string(),
        })
    }
}
