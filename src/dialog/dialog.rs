use super::{
    authenticate::{authorization_from_challenge, Credential},
    DialogId,
};
use crate::{
    rsip_ext::RsipResponseExt,
    transaction::{make_call_id, make_tag, make_via_branch, RequestSender},
    Result,
};
use rsip::{
    prelude::{HeadersExt, ToTypedHeader, UntypedHeader},
    typed::CSeq,
    Header, Method, Param, Request, Response,
};
use std::time::Duration;

/// Shared base of a client dialog: identity and target URIs, the current
/// expiration interval, request construction and the outbound seam to the
/// transaction layer.
///
/// For a REGISTER session the local and remote URIs are both the
/// address-of-record and the remote target is the registrar.
pub struct Dialog {
    pub id: DialogId,
    pub local_uri: rsip::Uri,
    pub remote_uri: rsip::Uri,
    pub remote_target: rsip::Uri,
    pub expires: u32,
    pub local_seq: u32,
    pub contact: rsip::typed::Contact,
    pub(super) credential: Option<Credential>,
    pub(super) authorization: Option<Header>,
    local_tag: rsip::param::Tag,
    call_id: rsip::headers::CallId,
    user_agent: String,
    request_sender: RequestSender,
}

impl Dialog {
    pub fn new(
        aor: rsip::Uri,
        server: rsip::Uri,
        contact: Option<rsip::typed::Contact>,
        credential: Option<Credential>,
        expires: u32,
        user_agent: String,
        request_sender: RequestSender,
    ) -> Self {
        let call_id = make_call_id(None);
        let local_tag = make_tag();
        let id = DialogId {
            call_id: call_id.value().to_string(),
            from_tag: local_tag.to_string(),
            to_tag: String::new(),
        };
        let contact = contact.unwrap_or_else(|| rsip::typed::Contact {
            display_name: None,
            uri: aor.clone(),
            params: vec![],
        });

        Self {
            id,
            local_uri: aor.clone(),
            remote_uri: aor,
            remote_target: server,
            expires,
            local_seq: 0,
            contact,
            credential,
            authorization: None,
            local_tag,
            call_id,
            user_agent,
            request_sender,
        }
    }

    /// Build a request skeleton from the current dialog state. Every call
    /// consumes a fresh CSeq and Via branch.
    pub fn make_request(&mut self, method: Method) -> Request {
        self.local_seq += 1;

        let via = rsip::typed::Via {
            version: rsip::Version::V2,
            transport: rsip::Transport::Udp,
            uri: rsip::Uri {
                scheme: None,
                auth: None,
                host_with_port: self.contact.uri.host_with_port.clone(),
                params: vec![],
                headers: vec![],
            },
            params: vec![make_via_branch(), Param::Other("rport".into(), None)],
        };
        let from = rsip::typed::From {
            display_name: None,
            uri: self.local_uri.clone(),
            params: vec![],
        }
        .with_tag(self.local_tag.clone());
        let to = rsip::typed::To {
            display_name: None,
            uri: self.remote_uri.clone(),
            params: vec![],
        };
        let cseq = CSeq {
            seq: self.local_seq,
            method: method.clone(),
        };

        let mut headers: rsip::Headers = vec![
            via.into(),
            Header::MaxForwards("70".into()),
            from.into(),
            to.into(),
            Header::CallId(self.call_id.clone()),
            cseq.into(),
            self.contact.clone().into(),
            Header::Expires(rsip::headers::Expires::from(self.expires)),
            Header::UserAgent(self.user_agent.clone().into()),
        ]
        .into();
        if let Some(auth) = &self.authorization {
            headers.unique_push(auth.clone());
        }

        Request {
            method,
            uri: self.remote_target.clone(),
            headers,
            version: rsip::Version::V2,
            body: vec![],
        }
    }

    /// Hand a finished request to the transaction layer. The outcome of the
    /// send is observed later as an incoming dialog event, not here.
    pub fn send_request(&self, request: Request) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| crate::Error::TransactionError(e.to_string()))
    }

    /// Merge server-provided state from a response into the dialog.
    ///
    /// A 2xx updates the remote tag, the registered contact and the
    /// effective expiry. An authentication challenge turns the response's
    /// challenge headers plus the dialog credential into the authorization
    /// header carried by every subsequent request; without a usable
    /// credential the merge fails and the caller cannot retry.
    pub fn update_from_response(&mut self, resp: &Response) -> Result<()> {
        if let Ok(to) = resp.to_header() {
            if let Ok(Some(tag)) = to.tag() {
                self.id.to_tag = tag.to_string();
            }
        }

        match u16::from(resp.status_code.clone()) {
            200..=299 => {
                if let Some(contact) = resp.contact_header().ok().and_then(|c| c.typed().ok()) {
                    self.contact = contact;
                }
                if let Some(expires) = resp.expires_value() {
                    self.expires = expires;
                }
                Ok(())
            }
            401 | 407 | 421 | 494 => {
                let cred = self.credential.as_ref().ok_or_else(|| {
                    crate::Error::DialogError(
                        "no credential available for challenge".to_string(),
                        self.id.clone(),
                    )
                })?;
                let auth =
                    authorization_from_challenge(resp, cred, &Method::Register, &self.remote_target)?;
                self.authorization = Some(auth);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Delay before the binding should be refreshed: three quarters of the
    /// expiry the response granted.
    pub fn refresh_delay(&self, resp: &Response) -> Duration {
        let expires = resp.expires_value().unwrap_or(self.expires);
        Duration::from_secs(expires as u64 * 3 / 4)
    }
}
