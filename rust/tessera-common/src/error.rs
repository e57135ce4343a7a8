use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn unsupported_conversion(from: impl Into<String>, to: impl Into<String>) -> Error {
        Error(
            ErrorKind::UnsupportedConversion {
                from: from.into(),
                to: to.into(),
            }
            .into(),
        )
    }

    pub fn stream_not_rewindable(
        storage: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Error {
        Error(
            ErrorKind::StreamNotRewindable {
                storage: storage.into(),
                source,
            }
            .into(),
        )
    }

    pub fn data_access(storage: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::DataAccess {
                storage: storage.into(),
                source,
            }
            .into(),
        )
    }

    pub fn close_failure(
        storage: impl Into<String>,
        source: std::io::Error,
        suppressed: Vec<std::io::Error>,
    ) -> Error {
        Error(
            ErrorKind::CloseFailure {
                storage: storage.into(),
                source,
                suppressed,
            }
            .into(),
        )
    }

    /// Returns `true` for failures that carry their own meaning and must cross
    /// wrapping layers unchanged. Only raw I/O failures are not domain errors.
    pub fn is_domain(&self) -> bool {
        !matches!(self.kind(), ErrorKind::DataAccess { .. })
    }

    /// Attaches the storage name to a `DataAccess` error that was created
    /// from a bare `std::io::Error` and does not know it yet.
    pub fn in_storage(mut self, name: &str) -> Error {
        if let ErrorKind::DataAccess { storage, .. } = self.0.as_mut() {
            if storage.is_empty() {
                *storage = name.to_string();
            }
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    #[error("stream '{storage}' can be read only once and has already been consumed")]
    StreamNotRewindable {
        storage: String,
        source: Option<std::io::Error>,
    },

    #[error("cannot open or read '{storage}': {source}")]
    DataAccess {
        storage: String,
        source: std::io::Error,
    },

    #[error(
        "failed to close '{storage}': {source} ({} more failure(s))",
        .suppressed.len()
    )]
    CloseFailure {
        storage: String,
        source: std::io::Error,
        suppressed: Vec<std::io::Error>,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::data_access("", e)
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_io_error_is_not_domain() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_domain());
        let err = err.in_storage("data.bin");
        match err.kind() {
            ErrorKind::DataAccess { storage, .. } => assert_eq!(storage, "data.bin"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_in_storage_keeps_existing_name() {
        let err =
            Error::data_access("first", std::io::ErrorKind::Other.into()).in_storage("second");
        assert!(err.to_string().contains("'first'"));
    }

    #[test]
    fn test_domain_errors() {
        assert!(Error::stream_not_rewindable("s", None).is_domain());
        assert!(Error::unsupported_conversion("InputStream", "Url").is_domain());
        assert!(Error::invalid_arg("key", "mismatch").is_domain());
    }

    #[test]
    fn test_close_failure_message() {
        let err = Error::close_failure(
            "s",
            std::io::Error::other("first"),
            vec![std::io::Error::other("second")],
        );
        let message = err.to_string();
        assert!(message.contains("first"));
        assert!(message.contains("1 more"));
    }
}
