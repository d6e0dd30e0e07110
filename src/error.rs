#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    #[error("Device acquisition failed for slot {0}: {1}")]
    Acquisition(usize, String),

    #[error("No device bound for slot {0}")]
    NotBound(usize),

    #[error("Device poll failed: {0}")]
    Poll(String),

    #[error("Hook install failed ({0}): {1}")]
    HookInstall(&'static str, String),

    #[error("Force feedback error: {0}")]
    Force(String),

    #[error("Native xinput resolution failed: {0}")]
    NativeResolution(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShimError>;
