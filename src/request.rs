use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kerberos::{normalize_realm, parse_service_principal};
use crate::{Error, ErrorKind, Result, Secret};

/// Input of one token request.
///
/// Constructed through [`AuthenticationRequest::new`] or deserialized with the field names
/// `username`, `password`, `realm`, `service`, `kdc` and `disable_fast_negotiation`; both paths validate.
/// The realm is stored uppercased.
#[derive(Clone, Deserialize)]
#[serde(try_from = "RawAuthenticationRequest")]
pub struct AuthenticationRequest {
    username: String,
    password: Secret<String>,
    realm: String,
    service: String,
    kdc: String,
    disable_fast_negotiation: bool,
}

impl fmt::Debug for AuthenticationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRequest")
            .field("username", &self.username)
            .field("password", &self.password)
            .field("realm", &self.realm)
            .field("service", &self.service)
            .field("kdc", &self.kdc)
            .field("disable_fast_negotiation", &self.disable_fast_negotiation)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuthenticationRequest {
    username: String,
    password: Secret<String>,
    realm: String,
    service: String,
    kdc: String,
    #[serde(default)]
    disable_fast_negotiation: bool,
}

impl TryFrom<RawAuthenticationRequest> for AuthenticationRequest {
    type Error = Error;

    fn try_from(raw: RawAuthenticationRequest) -> Result<Self> {
        let RawAuthenticationRequest {
            username,
            password,
            realm,
            service,
            kdc,
            disable_fast_negotiation,
        } = raw;

        Ok(AuthenticationRequest::new(username, password, &realm, service, kdc)?
            .with_fast_negotiation_disabled(disable_fast_negotiation))
    }
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("{field} must not be empty"),
        ));
    }

    Ok(())
}

impl AuthenticationRequest {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<Secret<String>>,
        realm: &str,
        service: impl Into<String>,
        kdc: impl Into<String>,
    ) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        let service = service.into();
        let kdc = kdc.into();

        required("username", &username)?;
        required("service", &service)?;
        required("kdc", &kdc)?;

        if password.is_empty() {
            return Err(Error::new(ErrorKind::InvalidConfiguration, "password must not be empty"));
        }

        if !username.is_ascii() || username.chars().any(|c| c.is_ascii_whitespace() || c.is_ascii_control()) {
            return Err(Error::new(
                ErrorKind::InvalidConfiguration,
                format!("username `{username}` contains invalid characters"),
            ));
        }

        let realm = normalize_realm(realm)?;
        parse_service_principal(&service)?;

        Ok(Self {
            username,
            password,
            realm,
            service,
            kdc,
            disable_fast_negotiation: false,
        })
    }

    /// Sends plain PA-ENC-TIMESTAMP instead of negotiating FAST with the KDC.
    pub fn with_fast_negotiation_disabled(mut self, disable_fast_negotiation: bool) -> Self {
        self.disable_fast_negotiation = disable_fast_negotiation;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Secret<String> {
        &self.password
    }

    /// Uppercased realm.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// KDC address list as given: `host[:port]`, optionally `tcp://` or `udp://`, comma separated.
    pub fn kdc(&self) -> &str {
        &self.kdc
    }

    pub fn disable_fast_negotiation(&self) -> bool {
        self.disable_fast_negotiation
    }
}

/// Output of a successful token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResult {
    /// Base64 SPNEGO token, ready for an `Authorization: Negotiate` header.
    token: Secret<String>,
    /// `<username>@<REALM>`
    id: String,
}

impl TokenResult {
    pub(crate) fn new(token: Secret<String>, id: String) -> Self {
        Self { token, id }
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn into_parts(self) -> (Secret<String>, String) {
        let TokenResult { token, id } = self;
        (token, id)
    }
}
