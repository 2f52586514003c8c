use rand::Rng;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub mod timer;

pub(crate) const CNONCE_LEN: usize = 8;

/// Outbound seam to the transaction layer: the dialog hands a finished
/// request over and observes the outcome later as an incoming dialog event.
pub type RequestSender = UnboundedSender<rsip::Request>;
pub type RequestReceiver = UnboundedReceiver<rsip::Request>;

pub fn random_text(count: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(count)
        .map(char::from)
        .collect()
}

pub fn make_call_id(suffix: Option<&str>) -> rsip::headers::CallId {
    format!("{}@{}", random_text(22), suffix.unwrap_or("regstack")).into()
}

pub fn make_tag() -> rsip::param::Tag {
    rsip::param::Tag::new(random_text(8))
}

pub fn make_via_branch() -> rsip::Param {
    rsip::Param::Branch(format!("z9hG4bK{}", random_text(12)).into())
}
