//! Error types for Sonda

use thiserror::Error;

/// Main error type for probe measurement operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid option \"{field}\": {reason}")]
    InvalidOptions { field: String, reason: String },

    #[error("Private IP ranges are not allowed")]
    PrivateDestination,

    #[error("Tool process error: {0}")]
    ToolProcess(String),

    #[error("{message} - {code}")]
    Network { message: String, code: String },

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_option(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_destination_message() {
        assert_eq!(
            Error::PrivateDestination.to_string(),
            "Private IP ranges are not allowed"
        );
    }

    #[test]
    fn test_network_error_message() {
        let err = Error::Network {
            message: "ENODATA google.com".to_string(),
            code: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "ENODATA google.com - abc");
    }

    #[test]
    fn test_invalid_option_names_field() {
        let err = Error::invalid_option("packets", "must be between 1 and 16");
        assert_eq!(
            err.to_string(),
            "Invalid option \"packets\": must be between 1 and 16"
        );
    }
}
