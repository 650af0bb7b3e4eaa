use std::{error::Error, fmt::Display};

#[derive(Debug)]
pub enum GuiError {
    FmtError(std::fmt::Error),
    IOError(std::io::Error),
    NoDevices,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::FmtError(e) => write!(f, "terminal formatting failed: {}", e),
            GuiError::IOError(e) => write!(f, "terminal io failed: {}", e),
            GuiError::NoDevices => write!(f, "no serial devices found"),
        }
    }
}

impl Error for GuiError {}

impl From<std::fmt::Error> for GuiError {
    fn from(value: std::fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
