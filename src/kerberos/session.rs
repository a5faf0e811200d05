use std::fmt;

use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{EncryptionKey, PrincipalName, Realm, Ticket};
use zeroize::Zeroize;

use super::utils::integer_to_u32;
use crate::{Error, ErrorKind, Result, Secret};

/// A Kerberos session key together with its encryption type.
#[derive(Clone)]
pub struct SessionKey {
    cipher: CipherSuite,
    key: Secret<Vec<u8>>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("cipher", &self.cipher)
            .field("key", &self.key)
            .finish()
    }
}

impl SessionKey {
    pub fn new(cipher: CipherSuite, key: Secret<Vec<u8>>) -> Self {
        Self { cipher, key }
    }

    /// Takes the key handed out by the KDC in an `EncKDCRepPart`. The source buffer is zeroized.
    pub(crate) fn take_encryption_key(key: &mut EncryptionKey) -> Result<Self> {
        let session_key = integer_to_u32(&key.key_type.0)
            .and_then(|etype| CipherSuite::try_from(etype as usize).ok())
            .map(|cipher| Self {
                cipher,
                key: Secret::new(key.key_value.0 .0.clone()),
            })
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InternalError,
                    format!("unsupported session key type: {:?}", key.key_type.0 .0),
                )
            });

        key.key_value.0 .0.zeroize();

        session_key
    }

    pub fn cipher(&self) -> &CipherSuite {
        &self.cipher
    }

    pub fn key(&self) -> &Secret<Vec<u8>> {
        &self.key
    }

    pub(crate) fn etype(&self) -> u8 {
        self.cipher.clone().into()
    }
}

/// Pre-authentication policy selected for the AS exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreAuthMode {
    /// Encrypted timestamp plus PA-REQ-ENC-PA-REP: the KDC proves it saw the unmodified AS-REQ
    /// and advertises FAST support in the encrypted part of the reply.
    FastNegotiation,
    /// Plain encrypted timestamp.
    EncryptedTimestamp,
}

impl PreAuthMode {
    pub fn from_options(disable_fast_negotiation: bool) -> Self {
        if disable_fast_negotiation {
            PreAuthMode::EncryptedTimestamp
        } else {
            PreAuthMode::FastNegotiation
        }
    }
}

/// Outcome of a successful AS exchange: the TGT and everything needed to use it.
///
/// Lives for one request. The session key is zeroized when the session is dropped or released.
#[derive(Debug)]
pub struct AuthenticatedSession {
    realm: String,
    client_realm: Realm,
    client_name: PrincipalName,
    ticket: Ticket,
    session_key: SessionKey,
    pre_auth_mode: PreAuthMode,
    fast_advertised: bool,
}

impl AuthenticatedSession {
    pub(crate) fn new(
        realm: String,
        client_realm: Realm,
        client_name: PrincipalName,
        ticket: Ticket,
        session_key: SessionKey,
        pre_auth_mode: PreAuthMode,
        fast_advertised: bool,
    ) -> Self {
        Self {
            realm,
            client_realm,
            client_name,
            ticket,
            session_key,
            pre_auth_mode,
            fast_advertised,
        }
    }

    /// Realm of the ticket-granting service that issued the TGT.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn client_realm(&self) -> &Realm {
        &self.client_realm
    }

    pub fn client_name(&self) -> &PrincipalName {
        &self.client_name
    }

    /// Client principal as `name@REALM`, as canonicalized by the KDC.
    pub fn client_principal(&self) -> String {
        principal_to_string(&self.client_name, &self.client_realm)
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn pre_auth_mode(&self) -> PreAuthMode {
        self.pre_auth_mode
    }

    /// The KDC returned PA-FX-FAST in the encrypted part of the AS-REP.
    pub fn fast_advertised(&self) -> bool {
        self.fast_advertised
    }

    /// Drops the session and wipes its key material.
    pub fn release(self) {}
}

impl Drop for AuthenticatedSession {
    fn drop(&mut self) {
        trace!(realm = %self.realm, "authenticated session released");
    }
}

/// A service ticket and its session key, bound to the client and the target service.
#[derive(Debug)]
pub struct ServiceCredential {
    service: String,
    client_realm: Realm,
    client_name: PrincipalName,
    ticket: Ticket,
    session_key: SessionKey,
}

impl ServiceCredential {
    pub(crate) fn new(
        service: String,
        client_realm: Realm,
        client_name: PrincipalName,
        ticket: Ticket,
        session_key: SessionKey,
    ) -> Self {
        Self {
            service,
            client_realm,
            client_name,
            ticket,
            session_key,
        }
    }

    /// Service name as supplied by the caller.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn client_realm(&self) -> &Realm {
        &self.client_realm
    }

    pub fn client_name(&self) -> &PrincipalName {
        &self.client_name
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }
}

pub(crate) fn principal_to_string(name: &PrincipalName, realm: &Realm) -> String {
    let name = name
        .name_string
        .0
        .0
        .iter()
        .map(|component| component.to_string())
        .collect::<Vec<_>>()
        .join("/");

    format!("{}@{}", name, realm.0)
}
