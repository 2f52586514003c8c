use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub mod authenticate;
pub mod dialog;
pub mod dialog_layer;
pub mod registration;

#[cfg(test)]
mod tests;

/// SIP Dialog Identifier
///
/// Identifies one registration session: the Call-ID plus the local (From)
/// tag chosen at creation. The remote (To) tag is learned from responses
/// and may stay empty for the whole session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DialogId {
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: String,
}

impl std::fmt::Display for DialogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.to_tag.is_empty() {
            write!(f, "{}-{}", self.call_id, self.from_tag)
        } else {
            write!(f, "{}-{}-{}", self.call_id, self.from_tag, self.to_tag)
        }
    }
}

/// Dialog-level events delivered by the transaction/transport layer.
///
/// The register dialog consumes these through
/// [`registration::RegisterDialog::on_dialog_event`]; classification of
/// `Message` responses by status code happens there, not at the call site.
#[derive(Debug)]
pub enum DialogEvent {
    Message(rsip::SipMessage),
    Cancelled,
    Terminated,
    TimedOut,
    Error,
    TransportError,
}

/// One-way notification to the application. The dialog never consults the
/// receiving side's result.
#[derive(Clone, Debug)]
pub struct RegisterAlert {
    pub status_code: rsip::StatusCode,
    pub reason: Option<String>,
    pub success: bool,
}

pub type RegisterAlertSender = UnboundedSender<RegisterAlert>;
pub type RegisterAlertReceiver = UnboundedReceiver<RegisterAlert>;
