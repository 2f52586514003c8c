use rsip::{
    message::HasHeaders,
    prelude::{HeadersExt, ToTypedHeader, UntypedHeader},
};

pub trait RsipResponseExt {
    fn reason_phrase(&self) -> Option<&str>;
    /// Effective expiry advertised by a response: the Contact header's
    /// `expires` parameter wins over a top-level Expires header.
    fn expires_value(&self) -> Option<u32>;
    /// Min-Expires header of a 423 response.
    fn min_expires(&self) -> Option<u32>;
}

impl RsipResponseExt for rsip::Response {
    fn reason_phrase(&self) -> Option<&str> {
        let headers = self.headers();
        for header in headers.iter() {
            if let rsip::Header::Other(name, value) = header {
                if name.eq_ignore_ascii_case("reason") {
                    return Some(value);
                }
            }
            if let rsip::Header::ErrorInfo(reason) = header {
                return Some(reason.value());
            }
        }
        None
    }

    fn expires_value(&self) -> Option<u32> {
        let contact_expires = self
            .contact_header()
            .ok()
            .and_then(|c| c.typed().ok())
            .and_then(|c| c.expires().and_then(|e| e.seconds().ok()));
        if contact_expires.is_some() {
            return contact_expires;
        }
        self.expires_header().and_then(|e| e.seconds().ok())
    }

    fn min_expires(&self) -> Option<u32> {
        for header in self.headers().iter() {
            if let rsip::Header::MinExpires(h) = header {
                return h.value().trim().parse::<u32>().ok();
            }
        }
        None
    }
}
