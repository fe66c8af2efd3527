use crate::audio::DeviceId;

/// Result alias that carries the custom [`RipplesError`] type.
pub type Result<T> = std::result::Result<T, RipplesError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum RipplesError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration values that cannot drive a simulation. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A capture device could not be found, opened or configured.
    #[error("device {id}: {reason}")]
    Device { id: DeviceId, reason: String },
    /// A running capture stream reported an error.
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl RipplesError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a configuration error with the provided message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Creates an error for a device that could not be found, opened or configured.
    pub fn device<T: Into<String>>(id: DeviceId, reason: T) -> Self {
        Self::Device {
            id,
            reason: reason.into(),
        }
    }
}

impl From<&str> for RipplesError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RipplesError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
