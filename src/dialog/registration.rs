use super::{dialog::Dialog, DialogEvent, DialogId, RegisterAlert, RegisterAlertSender};
use crate::{
    rsip_ext::RsipResponseExt,
    transaction::timer::{Timer, TimerId, INVALID_TIMER_ID},
    Result,
};
use rsip::{Response, SipMessage, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requested registration interval when the stack configuration does not
/// supply one.
pub const DEFAULT_EXPIRES: u32 = 3600;

/// State of a REGISTER session.
///
/// `Started` is the transient initial state, left on the first send.
/// `Trying` means a REGISTER is outstanding. `Connected` means the binding
/// is active and a refresh timer is pending. `Terminated` is terminal; no
/// event leaves it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterState {
    Started,
    Trying,
    Connected,
    Terminated,
}

impl std::fmt::Display for RegisterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterState::Started => write!(f, "Started"),
            RegisterState::Trying => write!(f, "Trying"),
            RegisterState::Connected => write!(f, "Connected"),
            RegisterState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Classified state machine input. Responses are classified by status code
/// in `on_dialog_event`, so the transition table below is the single place
/// that knows which edges are legal.
#[derive(Debug)]
pub(super) enum RegisterEvent {
    Send,
    Provisional(Response),
    Success(Response),
    AuthChallenge(Response),
    IntervalTooBrief(Response),
    Failure(Response),
    Cancel,
    Refresh,
    Unregister,
    TransportError,
    Error,
}

impl std::fmt::Display for RegisterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterEvent::Send => write!(f, "send"),
            RegisterEvent::Provisional(_) => write!(f, "1xx"),
            RegisterEvent::Success(_) => write!(f, "2xx"),
            RegisterEvent::AuthChallenge(_) => write!(f, "auth challenge"),
            RegisterEvent::IntervalTooBrief(_) => write!(f, "423"),
            RegisterEvent::Failure(_) => write!(f, "final failure"),
            RegisterEvent::Cancel => write!(f, "cancel"),
            RegisterEvent::Refresh => write!(f, "refresh"),
            RegisterEvent::Unregister => write!(f, "unregister"),
            RegisterEvent::TransportError => write!(f, "transport error"),
            RegisterEvent::Error => write!(f, "error"),
        }
    }
}

/// Side effect selected by a transition, executed after the state change.
pub(super) enum RegisterAction {
    Noop,
    SendRegister,
    MergeProvisional(Response),
    CompleteRegistration(Response),
    RetryWithCredentials(Response),
    RaiseExpires(Response),
}

/// The transition table. Returns the next state and the side effect to
/// perform, or gives the event back when no edge matches so the caller can
/// log and drop it.
pub(super) fn next_transition(
    state: RegisterState,
    event: RegisterEvent,
    registering: bool,
) -> std::result::Result<(RegisterState, RegisterAction), RegisterEvent> {
    use RegisterState::*;
    let transition = match (state, event) {
        (Started, RegisterEvent::Send) => (Trying, RegisterAction::SendRegister),
        (Trying, RegisterEvent::Provisional(resp)) => {
            (Trying, RegisterAction::MergeProvisional(resp))
        }
        (Trying, RegisterEvent::Success(resp)) => {
            let next = if registering { Connected } else { Terminated };
            (next, RegisterAction::CompleteRegistration(resp))
        }
        (Trying, RegisterEvent::AuthChallenge(resp)) => {
            (Trying, RegisterAction::RetryWithCredentials(resp))
        }
        (Trying, RegisterEvent::IntervalTooBrief(resp)) => {
            (Trying, RegisterAction::RaiseExpires(resp))
        }
        (Trying, RegisterEvent::Failure(_)) => (Terminated, RegisterAction::Noop),
        (Trying, RegisterEvent::Cancel) => (Terminated, RegisterAction::Noop),
        (Connected, RegisterEvent::Unregister) => (Trying, RegisterAction::Noop),
        (Connected, RegisterEvent::Refresh) => (Trying, RegisterAction::SendRegister),
        (_, RegisterEvent::TransportError) => (Terminated, RegisterAction::Noop),
        (_, RegisterEvent::Error) => (Terminated, RegisterAction::Noop),
        (_, event) => return Err(event),
    };
    Ok(transition)
}

struct RefreshTimer {
    id: TimerId,
    timeout: Duration,
}

pub(super) struct RegisterDialogInner {
    state: RegisterState,
    registering: bool,
    running: bool,
    auth_attempted: bool,
    dialog: Dialog,
    refresh_timer: RefreshTimer,
    timer: Arc<Timer<DialogId>>,
    alert_sender: RegisterAlertSender,
}

/// Client-side REGISTER dialog
///
/// Drives one registration session (initial register, refresh,
/// de-register) through the RFC 3261 section 10 state machine. Events from
/// the transaction layer arrive through [`RegisterDialog::on_dialog_event`],
/// refresh timer fires through [`RegisterDialog::on_timer_event`], and the
/// application starts the session with [`RegisterDialog::start`]. Every
/// entry point runs under the dialog lock, so one transition executes at a
/// time and each is complete, send included, before the call returns.
///
/// Recoverable failures are retried in place: an authentication challenge
/// resends with credentials once per attempt cycle, and a 423 resends with
/// the server's minimum interval. Terminal failures emit one failure alert
/// and leave the dialog in `Terminated`; the owner decides when to release
/// it.
#[derive(Clone)]
pub struct RegisterDialog {
    inner: Arc<Mutex<RegisterDialogInner>>,
}

impl RegisterDialog {
    pub(super) fn new(
        dialog: Dialog,
        registering: bool,
        timer: Arc<Timer<DialogId>>,
        alert_sender: RegisterAlertSender,
    ) -> Self {
        let refresh_timer = RefreshTimer {
            id: INVALID_TIMER_ID,
            timeout: Duration::from_secs(dialog.expires as u64),
        };
        Self {
            inner: Arc::new(Mutex::new(RegisterDialogInner {
                state: RegisterState::Started,
                registering,
                running: false,
                auth_attempted: false,
                dialog,
                refresh_timer,
                timer,
                alert_sender,
            })),
        }
    }

    /// Start the session: Started -> Trying, first REGISTER sent. Fails
    /// without side effect if the dialog is already running.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return Err(crate::Error::DialogError(
                "dialog is already running".to_string(),
                inner.dialog.id.clone(),
            ));
        }
        inner.running = true;
        inner.process(RegisterEvent::Send);
        Ok(())
    }

    /// Entry point for events delivered by the transaction/transport layer.
    ///
    /// Responses are classified strictly by status code: <=199 provisional,
    /// 2xx success, 401/407/421/494 auth challenge, 423 interval too brief,
    /// everything else a final failure. Cancellation and
    /// transport-level failures collapse the dialog to `Terminated`.
    pub fn on_dialog_event(&self, event: DialogEvent) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match event {
            DialogEvent::Message(SipMessage::Request(req)) => {
                debug!(
                    "dialog {} ignoring incoming {} request",
                    inner.dialog.id, req.method
                );
            }
            DialogEvent::Message(SipMessage::Response(resp)) => {
                let code = u16::from(resp.status_code.clone());
                if code <= 199 {
                    inner.process(RegisterEvent::Provisional(resp));
                } else if code <= 299 {
                    inner.process(RegisterEvent::Success(resp));
                } else if matches!(code, 401 | 407 | 421 | 494) {
                    inner.process(RegisterEvent::AuthChallenge(resp));
                } else if code == 423 {
                    inner.process(RegisterEvent::IntervalTooBrief(resp));
                } else if code <= 699 {
                    inner.process(RegisterEvent::Failure(resp));
                } else {
                    warn!("not supported status code: {}", code);
                    let reason = resp.reason_phrase().map(|r| r.to_string());
                    inner.signal_error(resp.status_code.clone(), reason);
                }
            }
            DialogEvent::Cancelled => inner.process(RegisterEvent::Cancel),
            DialogEvent::Terminated
            | DialogEvent::TimedOut
            | DialogEvent::Error
            | DialogEvent::TransportError => inner.process(RegisterEvent::TransportError),
        }
        Ok(())
    }

    /// Entry point for timer fires. Only the pending refresh timer's id is
    /// recognized; a stale or unknown id is rejected without touching the
    /// dialog, which guards against a fire racing a cancellation.
    pub fn on_timer_event(&self, timer_id: TimerId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if timer_id == INVALID_TIMER_ID || timer_id != inner.refresh_timer.id {
            return Err(crate::Error::TimerError(format!(
                "no pending refresh timer with id {}",
                timer_id
            )));
        }
        inner.refresh_timer.id = INVALID_TIMER_ID;
        inner.process(RegisterEvent::Refresh);
        Ok(())
    }

    /// De-registration hook: Connected -> Trying.
    pub fn unregister(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != RegisterState::Connected {
            return Err(crate::Error::DialogError(
                "dialog is not connected".to_string(),
                inner.dialog.id.clone(),
            ));
        }
        inner.process(RegisterEvent::Unregister);
        Ok(())
    }

    pub fn id(&self) -> DialogId {
        self.inner.lock().unwrap().dialog.id.clone()
    }

    pub fn state(&self) -> RegisterState {
        self.inner.lock().unwrap().state
    }

    /// Current requested expiration interval in seconds.
    pub fn expires(&self) -> u32 {
        self.inner.lock().unwrap().dialog.expires
    }

    /// Id of the pending refresh timer, if one is scheduled.
    pub fn pending_refresh(&self) -> Option<TimerId> {
        let inner = self.inner.lock().unwrap();
        match inner.refresh_timer.id {
            INVALID_TIMER_ID => None,
            id => Some(id),
        }
    }
}

impl RegisterDialogInner {
    fn process(&mut self, event: RegisterEvent) {
        match next_transition(self.state, event, self.registering) {
            Ok((next, action)) => {
                self.set_state(next);
                self.apply(action);
            }
            Err(event) => {
                debug!(
                    "dialog {} ignoring {} event in {} state",
                    self.dialog.id, event, self.state
                );
            }
        }
    }

    fn set_state(&mut self, next: RegisterState) {
        if self.state != next {
            info!(
                "dialog {} transitioning state: {} -> {}",
                self.dialog.id, self.state, next
            );
        }
        self.state = next;
        if next == RegisterState::Terminated {
            self.cancel_refresh_timer();
        }
    }

    fn apply(&mut self, action: RegisterAction) {
        match action {
            RegisterAction::Noop => {}
            RegisterAction::SendRegister => {
                self.auth_attempted = false;
                self.send_register();
            }
            RegisterAction::MergeProvisional(resp) => {
                if let Err(e) = self.dialog.update_from_response(&resp) {
                    debug!("dialog {} provisional merge failed: {}", self.dialog.id, e);
                }
            }
            RegisterAction::CompleteRegistration(resp) => {
                let reason = resp.reason_phrase().map(|r| r.to_string());
                self.alert(resp.status_code.clone(), reason, true);
                if let Err(e) = self.dialog.update_from_response(&resp) {
                    debug!("dialog {} response merge failed: {}", self.dialog.id, e);
                }
                self.auth_attempted = false;
                if self.state == RegisterState::Connected {
                    self.refresh_timer.timeout = self.dialog.refresh_delay(&resp);
                    self.schedule_refresh();
                }
            }
            RegisterAction::RetryWithCredentials(resp) => {
                let reason = resp.reason_phrase().map(|r| r.to_string());
                if self.auth_attempted {
                    info!(
                        "dialog {} challenged again after authenticated resend",
                        self.dialog.id
                    );
                    self.signal_error(resp.status_code, reason);
                    return;
                }
                match self.dialog.update_from_response(&resp) {
                    Ok(()) => {
                        self.auth_attempted = true;
                        self.send_register();
                    }
                    Err(e) => {
                        info!("dialog {} credential merge failed: {}", self.dialog.id, e);
                        self.signal_error(resp.status_code, reason);
                    }
                }
            }
            RegisterAction::RaiseExpires(resp) => {
                // RFC 3261 10.2.8: the UA may retry after making the
                // expiration interval equal to or greater than the one in
                // the Min-Expires header of the 423 response.
                let reason = resp.reason_phrase().map(|r| r.to_string());
                match resp.min_expires() {
                    Some(min) if min > self.dialog.expires => {
                        self.dialog.expires = min;
                        self.send_register();
                    }
                    Some(min) => {
                        warn!(
                            "dialog {} got 423 with minimum {} not above current expires {}",
                            self.dialog.id, min, self.dialog.expires
                        );
                        self.signal_error(resp.status_code, reason);
                    }
                    None => {
                        warn!("dialog {} got 423 without Min-Expires", self.dialog.id);
                        self.signal_error(resp.status_code, reason);
                    }
                }
            }
        }
    }

    fn send_register(&mut self) {
        let request = self.dialog.make_request(rsip::Method::Register);
        if let Err(e) = self.dialog.send_request(request) {
            warn!("dialog {} failed to send REGISTER: {}", self.dialog.id, e);
            self.signal_error(
                StatusCode::ServerInternalError,
                Some("request send failed".to_string()),
            );
        }
    }

    fn signal_error(&mut self, status_code: StatusCode, reason: Option<String>) {
        self.alert(status_code, reason, false);
        self.process(RegisterEvent::Error);
    }

    fn alert(&self, status_code: StatusCode, reason: Option<String>, success: bool) {
        self.alert_sender
            .send(RegisterAlert {
                status_code,
                reason,
                success,
            })
            .ok();
    }

    fn schedule_refresh(&mut self) {
        self.cancel_refresh_timer();
        self.refresh_timer.id = self
            .timer
            .timeout(self.refresh_timer.timeout, self.dialog.id.clone());
        debug!(
            "dialog {} refresh scheduled in {:?}",
            self.dialog.id, self.refresh_timer.timeout
        );
    }

    fn cancel_refresh_timer(&mut self) {
        if self.refresh_timer.id != INVALID_TIMER_ID {
            self.timer.cancel(self.refresh_timer.id);
            self.refresh_timer.id = INVALID_TIMER_ID;
        }
    }
}

impl Drop for RegisterDialogInner {
    fn drop(&mut self) {
        self.cancel_refresh_timer();
    }
}
