use thiserror::Error;

/// Failures of the OS adapter layer. Public operations never surface this
/// type; they log it and report plain failure.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("PDH_STATUS(0x{0:08X})")]
    Pdh(u32),
    #[error("can't open process handle")]
    ProcessHandle,
    #[error("process enumeration failed")]
    ProcessSnapshot,
    #[error("graphics adapter enumeration failed")]
    AdapterEnumeration,
    #[error("can't create tick event")]
    TickEvent,
    #[error("no cpu cores reported")]
    CpuCount,
    #[error("not supported on this platform")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
