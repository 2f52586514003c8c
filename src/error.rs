use crate::dialog::DialogId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    SipMessageError(String),
    TransactionError(String),
    TimerError(String),
    DialogError(String, DialogId),
    Error(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SipMessageError(e) => write!(f, "sip message error: {}", e),
            Error::TransactionError(e) => write!(f, "transaction error: {}", e),
            Error::TimerError(e) => write!(f, "timer error: {}", e),
            Error::DialogError(e, id) => write!(f, "dialog error: {} ({})", e, id),
            Error::Error(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<rsip::Error> for Error {
    fn from(e: rsip::Error) -> Self {
        Error::SipMessageError(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::TransactionError(e.to_string())
    }
}
