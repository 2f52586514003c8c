use crate::transaction::{random_text, CNONCE_LEN};
use crate::Result;
use rsip::headers::auth::{AuthQop, Qop};
use rsip::prelude::{HasHeaders, HeadersExt, ToTypedHeader};
use rsip::services::DigestGenerator;
use rsip::typed::{Authorization, ProxyAuthorization};
use rsip::{Header, Method, Response, Uri};

/// SIP Authentication Credentials
///
/// Digest authentication material used when a server challenges a request
/// with 401 Unauthorized or 407 Proxy Authentication Required. The realm is
/// optional; the realm of the challenge is what ends up in the digest.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub realm: Option<String>,
}

/// Build the authorization header answering a challenge response.
///
/// Parses the `WWW-Authenticate` (401) or `Proxy-Authenticate` (407)
/// challenge, computes the digest response for `method` on `uri` per
/// RFC 2617, and returns the matching `Authorization` /
/// `Proxy-Authorization` header to attach to the retried request.
pub fn authorization_from_challenge(
    resp: &Response,
    cred: &Credential,
    method: &Method,
    uri: &Uri,
) -> Result<Header> {
    let challenge_header = match resp.www_authenticate_header() {
        Some(h) => Header::WwwAuthenticate(h.clone()),
        None => {
            let proxy_header = rsip::header_opt!(resp.headers().iter(), Header::ProxyAuthenticate);
            let proxy_header = proxy_header.ok_or(crate::Error::SipMessageError(
                "missing proxy/www authenticate header".to_string(),
            ))?;
            Header::ProxyAuthenticate(proxy_header.clone())
        }
    };

    let challenge = match &challenge_header {
        Header::WwwAuthenticate(h) => h.typed()?,
        Header::ProxyAuthenticate(h) => h.typed()?.0,
        _ => unreachable!(),
    };

    let cnonce = random_text(CNONCE_LEN);
    let auth_qop = match challenge.qop {
        Some(Qop::Auth) => Some(AuthQop::Auth { cnonce, nc: 1 }),
        Some(Qop::AuthInt) => Some(AuthQop::AuthInt { cnonce, nc: 1 }),
        _ => None,
    };

    // MD5 when the challenge names no algorithm (RFC 2617 compatibility)
    let algorithm = challenge
        .algorithm
        .unwrap_or(rsip::headers::auth::Algorithm::Md5);

    let response = DigestGenerator {
        username: cred.username.as_str(),
        password: cred.password.as_str(),
        algorithm,
        nonce: challenge.nonce.as_str(),
        method,
        qop: auth_qop.as_ref(),
        uri,
        realm: challenge.realm.as_str(),
    }
    .compute();

    let auth = Authorization {
        scheme: challenge.scheme,
        username: cred.username.clone(),
        realm: challenge.realm,
        nonce: challenge.nonce,
        uri: uri.clone(),
        response,
        algorithm: Some(algorithm),
        opaque: challenge.opaque,
        qop: auth_qop,
    };

    match challenge_header {
        Header::WwwAuthenticate(_) => Ok(auth.into()),
        Header::ProxyAuthenticate(_) => Ok(ProxyAuthorization(auth).into()),
        _ => unreachable!(),
    }
}
