use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("sample source timeout")]
    Timeout,
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    #[error("sample source disconnected")]
    Disconnected,
    #[error("no free state machine (all {0} claimed)")]
    NoFreeStateMachine(u8),
    #[error("storage access out of bounds: offset {offset:#x}, len {len}")]
    OutOfBounds { offset: u32, len: usize },
    #[error("storage offset {0:#x} is not sector aligned")]
    Unaligned(u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
