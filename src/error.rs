use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Process exit code for scripting; distinct per failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReportError::Config(_) => 2,
            ReportError::Authentication(_) => 3,
            ReportError::Transport(_) => 4,
            ReportError::Protocol(_) => 5,
            ReportError::Data(_) => 6,
            ReportError::Delivery(_) => 7,
            ReportError::Workbook(_) | ReportError::Io(_) => 1,
        }
    }
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ReportError::Protocol(err.to_string())
        } else if err.is_timeout() {
            ReportError::Transport(format!("request timed out: {err}"))
        } else {
            ReportError::Transport(err.to_string())
        }
    }
}

pub type ReportResult<T> = Result<T, ReportError>;
