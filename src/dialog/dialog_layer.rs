use super::authenticate::Credential;
use super::dialog::Dialog;
use super::registration::{RegisterDialog, DEFAULT_EXPIRES};
use super::{DialogId, RegisterAlertSender};
use crate::transaction::{timer::Timer, RequestSender};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const USER_AGENT: &str = "regstack/0.1";

/// Configuration for one registration session, taken from the owning
/// stack's configuration.
pub struct RegisterOption {
    /// Registrar the REGISTER is sent to; also the request URI.
    pub server: rsip::Uri,
    /// Address-of-record being bound, used for From and To.
    pub aor: rsip::Uri,
    /// Contact to bind; derived from the address-of-record when absent.
    pub contact: Option<rsip::typed::Contact>,
    pub credential: Option<Credential>,
    /// Requested interval in seconds, `DEFAULT_EXPIRES` when absent.
    pub expires: Option<u32>,
}

pub struct DialogLayerInner {
    pub(super) timer: Arc<Timer<DialogId>>,
    pub(super) dialogs: RwLock<HashMap<DialogId, RegisterDialog>>,
    request_sender: RequestSender,
    cancel_token: CancellationToken,
    timer_interval: Duration,
}
pub type DialogLayerInnerRef = Arc<DialogLayerInner>;

/// Owns the live register dialogs and pumps the timer service.
///
/// Dialogs are created here, wired to the transaction layer's request
/// channel and the shared timer, and stay registered until the owner
/// removes them. `serve` polls the timer and dispatches refresh fires to
/// the owning dialog until the cancellation token fires.
pub struct DialogLayer {
    pub inner: DialogLayerInnerRef,
}

impl DialogLayer {
    pub fn new(request_sender: RequestSender, cancel_token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(DialogLayerInner {
                timer: Arc::new(Timer::new()),
                dialogs: RwLock::new(HashMap::new()),
                request_sender,
                cancel_token,
                timer_interval: Duration::from_millis(20),
            }),
        }
    }

    /// Create a register-intent dialog. The dialog is wired and registered
    /// but not started; call [`RegisterDialog::start`] to send the first
    /// REGISTER.
    pub fn create_register_dialog(
        &self,
        option: RegisterOption,
        alert_sender: RegisterAlertSender,
    ) -> RegisterDialog {
        self.create_dialog(option, true, alert_sender)
    }

    /// Create an unregister-intent dialog: same state machine, but the
    /// REGISTER carries `Expires: 0` and a 2xx terminates the session
    /// instead of connecting it.
    pub fn create_unregister_dialog(
        &self,
        option: RegisterOption,
        alert_sender: RegisterAlertSender,
    ) -> RegisterDialog {
        self.create_dialog(option, false, alert_sender)
    }

    fn create_dialog(
        &self,
        option: RegisterOption,
        registering: bool,
        alert_sender: RegisterAlertSender,
    ) -> RegisterDialog {
        let expires = if registering {
            option.expires.unwrap_or(DEFAULT_EXPIRES)
        } else {
            0
        };
        let dialog = Dialog::new(
            option.aor,
            option.server,
            option.contact,
            option.credential,
            expires,
            USER_AGENT.to_string(),
            self.inner.request_sender.clone(),
        );
        let id = dialog.id.clone();
        let dialog =
            RegisterDialog::new(dialog, registering, self.inner.timer.clone(), alert_sender);
        self.inner
            .dialogs
            .write()
            .unwrap()
            .insert(id.clone(), dialog.clone());
        info!("register dialog created: {}", id);
        dialog
    }

    pub fn get_dialog(&self, id: &DialogId) -> Option<RegisterDialog> {
        let dialogs = self.inner.dialogs.read().unwrap();
        if let Some(dialog) = dialogs.get(id) {
            return Some(dialog.clone());
        }
        // The registry key was taken before any response supplied a remote
        // tag, so fall back to matching without it.
        dialogs
            .iter()
            .find(|(key, _)| key.call_id == id.call_id && key.from_tag == id.from_tag)
            .map(|(_, dialog)| dialog.clone())
    }

    pub fn remove_dialog(&self, id: &DialogId) {
        info!("remove dialog: {}", id);
        self.inner.dialogs.write().unwrap().remove(id);
    }

    /// Drain the timers due at `now` and hand each fire to its dialog. A
    /// fire whose dialog is gone or whose id went stale is dropped.
    pub fn process_timer_fires(&self, now: Instant) {
        for (timer_id, dialog_id) in self.inner.timer.poll(now) {
            match self.get_dialog(&dialog_id) {
                Some(dialog) => {
                    if let Err(e) = dialog.on_timer_event(timer_id) {
                        debug!("stale timer {} for dialog {}: {}", timer_id, dialog_id, e);
                    }
                }
                None => debug!("timer {} fired for unknown dialog {}", timer_id, dialog_id),
            }
        }
    }

    pub async fn serve(&self) {
        select! {
            _ = self.inner.cancel_token.cancelled() => {
                info!("dialog layer cancelled");
            },
            _ = self.process_timer() => {
            }
        }
        info!("dialog layer shutdown");
    }

    async fn process_timer(&self) {
        loop {
            self.process_timer_fires(Instant::now());
            tokio::time::sleep(self.inner.timer_interval).await;
        }
    }

    pub fn shutdown(&self) {
        self.inner.cancel_token.cancel();
    }
}
