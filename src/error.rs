//! The error type shared by the scheduler and the tracker.
//!
//! Only [`LearnMemError::Configuration`] and
//! [`LearnMemError::HardwareConnection`] are allowed to end a run. Everything
//! else is logged and isolated to the event thread or frame it happened in.

use std::{borrow::Cow, fmt};

/// Everything that can go wrong while loading, controlling or tracking.
#[derive(Debug)]
pub enum LearnMemError {
    /// Malformed or incomplete paradigm, mapping or configuration input.
    Configuration(String),

    /// The board could not be opened or stopped answering.
    HardwareConnection(String),

    /// A single write to a channel failed. Never fatal to other channels.
    Hardware(String),

    /// A transient failure to read a frame from a frame source.
    FrameUnavailable(String),

    /// Returned when io fails when reading or writing files.
    Io(std::io::Error),

    /// Returned when a CSV table cannot be read or written.
    Csv(csv::Error),

    /// Returned when serialization of the configuration fails.
    RonSerialize(ron::Error),

    /// Returned when deserialization of the configuration fails.
    RonDeserialize(ron::de::SpannedError),

    /// Returned when an image cannot be decoded or encoded.
    Image(image::ImageError),
}

impl fmt::Display for LearnMemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LearnMemError as LME;
        let msg = match self {
            LME::Configuration(msg) => Cow::from(format!("configuration error: {}", msg)),
            LME::HardwareConnection(msg) => {
                Cow::from(format!("hardware connection error: {}", msg))
            }
            LME::Hardware(msg) => Cow::from(format!("hardware error: {}", msg)),
            LME::FrameUnavailable(msg) => Cow::from(format!("frame unavailable: {}", msg)),
            LME::Io(error) => Cow::from(format!("io error: {}", error)),
            LME::Csv(error) => Cow::from(format!("csv error: {}", error)),
            LME::RonSerialize(error) => Cow::from(format!("ron error: {}", error)),
            LME::RonDeserialize(error) => Cow::from(format!("ron spanning error: {}", error)),
            LME::Image(error) => Cow::from(format!("image error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for LearnMemError {}

impl LearnMemError {
    /// Whether this error must abort the whole run rather than a single
    /// event or frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LearnMemError::Configuration(_) | LearnMemError::HardwareConnection(_)
        )
    }
}

impl From<std::io::Error> for LearnMemError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for LearnMemError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<ron::Error> for LearnMemError {
    fn from(value: ron::Error) -> Self {
        Self::RonSerialize(value)
    }
}

impl From<ron::de::SpannedError> for LearnMemError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonDeserialize(value)
    }
}

impl From<image::ImageError> for LearnMemError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, LearnMemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_time_errors_are_fatal() {
        assert!(LearnMemError::Configuration("x".into()).is_fatal());
        assert!(LearnMemError::HardwareConnection("x".into()).is_fatal());
        assert!(!LearnMemError::Hardware("x".into()).is_fatal());
        assert!(!LearnMemError::FrameUnavailable("x".into()).is_fatal());
    }

    #[test]
    fn display_names_the_kind() {
        let err = LearnMemError::Configuration("missing column start".into());
        assert_eq!(err.to_string(), "configuration error: missing column start");
    }
}
