use thiserror::Error;

/// Per-read failures, delivered through the read callback. All of these are
/// recovered locally; the directory itself stays valid.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VfsError {
    #[error("No entry matches the requested path")]
    NotFound,

    #[error("Failed to decode source frame: {0}")]
    Decode(String),

    #[error("Failed to render frame: {0}")]
    Render(String),

    #[error("Frame production failed recently, in cooldown")]
    CoolingDown,
}

impl VfsError {
    /// Negative error code for the host-OS adapter; zero is success.
    pub fn os_code(&self) -> i32 {
        match self {
            VfsError::NotFound => -2,
            VfsError::Decode(_) => -5,
            VfsError::Render(_) => -5,
            VfsError::CoolingDown => -11,
        }
    }
}
