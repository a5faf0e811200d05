//! SPNEGO ([RFC 4178](https://www.rfc-editor.org/rfc/rfc4178)) initial token.
//!
//! Only the initiator's first leg is produced: a `NegTokenInit` offering `[krb5, ms-krb5]` with the
//! Kerberos AP-REQ as optimistic mech token. The acceptor's reply is never read.

mod extractors;
mod generators;

use std::fmt;

pub use extractors::{decode_krb5_ap_req, decode_neg_token_init};
use picky_krb::gss_api::{ApplicationTag0, GssApiNegInit};
use picky_krb::messages::ApReq;

use self::generators::{generate_krb5_ap_req_token, generate_neg_token_init};
use crate::Result;

/// SPNEGO `NegTokenInit` negotiated for one service.
#[derive(Clone, PartialEq, Eq)]
pub struct SpnegoToken {
    service: String,
    mech_token: Vec<u8>,
}

impl fmt::Debug for SpnegoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpnegoToken")
            .field("service", &self.service)
            .field("mech_token_len", &self.mech_token.len())
            .finish()
    }
}

impl SpnegoToken {
    /// `mech_token` is the GSS-API token of the first offered mechanism.
    pub fn new(service: impl Into<String>, mech_token: Vec<u8>) -> Self {
        Self {
            service: service.into(),
            mech_token,
        }
    }

    pub(crate) fn from_ap_req(service: &str, ap_req: ApReq) -> Result<Self> {
        Ok(Self::new(service, generate_krb5_ap_req_token(ap_req)?))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn mech_token(&self) -> &[u8] {
        &self.mech_token
    }

    pub fn neg_token_init(&self) -> ApplicationTag0<GssApiNegInit> {
        generate_neg_token_init(self.mech_token.clone())
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(picky_asn1_der::to_vec(&self.neg_token_init())?)
    }
}
