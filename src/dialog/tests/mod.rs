use crate::dialog::authenticate::Credential;
use crate::dialog::dialog_layer::{DialogLayer, RegisterOption};
use crate::dialog::registration::RegisterDialog;
use crate::dialog::{DialogEvent, RegisterAlertReceiver};
use crate::transaction::RequestReceiver;
use rsip::headers::*;
use rsip::StatusCode;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;


pub(super) struct TestDialog {
    pub layer: DialogLayer,
    pub dialog: RegisterDialog,
    pub requests: RequestReceiver,
    pub alerts: RegisterAlertReceiver,
}

pub(super) fn create_register_option(
    expires: Option<u32>,
    credential: Option<Credential>,
) -> RegisterOption {
    RegisterOption {
        server: rsip::Uri::try_from("sip:sip.example.com").unwrap(),
        aor: rsip::Uri::try_from("sip:alice@example.com").unwrap(),
        contact: None,
        credential,
        expires,
    }
}

pub(super) fn create_test_dialog(
    expires: Option<u32>,
    credential: Option<Credential>,
) -> TestDialog {
    create_test_dialog_with(expires, credential, true)
}

pub(super) fn create_test_dialog_with(
    expires: Option<u32>,
    credential: Option<Credential>,
    registering: bool,
) -> TestDialog {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (request_sender, requests) = unbounded_channel();
    let (alert_sender, alerts) = unbounded_channel();
    let layer = DialogLayer::new(request_sender, CancellationToken::new());
    let option = create_register_option(expires, credential);
    let dialog = if registering {
        layer.create_register_dialog(option, alert_sender)
    } else {
        layer.create_unregister_dialog(option, alert_sender)
    };
    TestDialog {
        layer,
        dialog,
        requests,
        alerts,
    }
}

/// Build a REGISTER response the way a registrar would answer, with `extra`
/// appended to the boilerplate headers.
pub(super) fn create_response(status: StatusCode, extra: Vec<rsip::Header>) -> rsip::Response {
    let mut headers: Vec<rsip::Header> = vec![
        Via::new("SIP/2.0/UDP alice.example.com:5060;branch=z9hG4bKnashds").into(),
        CSeq::new("1 REGISTER").into(),
        From::new("<sip:alice@example.com>;tag=1928301774").into(),
        To::new("<sip:alice@example.com>;tag=reg-tag-1").into(),
        CallId::new("a84b4c76e66710@pc33.atlanta.com").into(),
    ];
    headers.extend(extra);
    rsip::Response {
        status_code: status,
        version: rsip::Version::V2,
        headers: headers.into(),
        body: vec![],
    }
}

pub(super) fn response_event(resp: rsip::Response) -> DialogEvent {
    DialogEvent::Message(rsip::SipMessage::Response(resp))
}

pub(super) fn create_challenge_response(status: StatusCode) -> rsip::Response {
    let challenge =
        r#"Digest realm="example.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", algorithm=MD5, qop="auth""#;
    let header: rsip::Header = match status {
        StatusCode::ProxyAuthenticationRequired => ProxyAuthenticate::new(challenge).into(),
        _ => WwwAuthenticate::new(challenge).into(),
    };
    create_response(status, vec![header])
}
