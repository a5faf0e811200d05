use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::network_client::NetworkProtocol;
use crate::{Error, ErrorKind, Result};

/// Default port of the Kerberos KDC service.
pub const DEFAULT_KDC_PORT: u16 = 88;

/// Default per-address bound for a single KDC exchange.
pub const DEFAULT_KDC_TIMEOUT: Duration = Duration::from_secs(10);

/// In-memory Kerberos client configuration: one realm and its KDCs.
///
/// Built per request by [`KerberosConfigBuilder`] and never persisted.
#[derive(Clone)]
pub struct KerberosConfig {
    realm: String,
    kdc_urls: Vec<Url>,
    timeout: Duration,
}

impl Debug for KerberosConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KerberosConfig")
            .field("realm", &self.realm)
            .field("kdc_urls", &self.kdc_urls.iter().map(Url::as_str).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl KerberosConfig {
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// KDC addresses in the order they are tried.
    pub fn kdc_urls(&self) -> &[Url] {
        &self.kdc_urls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone)]
pub struct KerberosConfigBuilder<'a> {
    realm: &'a str,
    kdc_address: &'a str,
    timeout: Duration,
}

impl<'a> KerberosConfigBuilder<'a> {
    /// `kdc_address` is `host[:port]`, optionally prefixed with `tcp://` or `udp://`.
    /// Several addresses may be given separated by commas.
    pub fn new(realm: &'a str, kdc_address: &'a str) -> Self {
        Self {
            realm,
            kdc_address,
            timeout: DEFAULT_KDC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the inputs and assembles the configuration. No network I/O happens here.
    pub fn build(self) -> Result<KerberosConfig> {
        let realm = normalize_realm(self.realm)?;

        if self.timeout.is_zero() {
            return Err(Error::new(ErrorKind::InvalidConfiguration, "KDC timeout must not be zero"));
        }

        let kdc_urls = self
            .kdc_address
            .split(',')
            .map(parse_kdc_url)
            .collect::<Result<Vec<_>>>()?;

        debug!(%realm, kdc_count = kdc_urls.len(), "Kerberos configuration built");

        Ok(KerberosConfig {
            realm,
            kdc_urls,
            timeout: self.timeout,
        })
    }
}

/// Validates a realm name and returns it uppercased.
pub fn normalize_realm(realm: &str) -> Result<String> {
    let realm = realm.trim();

    if realm.is_empty() {
        return Err(Error::new(ErrorKind::InvalidConfiguration, "realm must not be empty"));
    }

    if !realm.is_ascii() || realm.chars().any(|c| c.is_ascii_whitespace() || c.is_ascii_control() || c == '@') {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("realm `{realm}` contains invalid characters"),
        ));
    }

    Ok(realm.to_ascii_uppercase())
}

/// Parses a single KDC address into a `tcp://host:port` or `udp://host:port` URL.
pub fn parse_kdc_url(kdc: &str) -> Result<Url> {
    let kdc = kdc.trim();

    if kdc.is_empty() {
        return Err(Error::new(ErrorKind::InvalidConfiguration, "KDC address must not be empty"));
    }

    let kdc = if kdc.contains("://") {
        kdc.to_owned()
    } else {
        format!("tcp://{}", kdc)
    };

    let mut url = Url::from_str(&kdc)?;

    if NetworkProtocol::from_url_scheme(url.scheme()).is_none() {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("invalid protocol `{}` for KDC server", url.scheme()),
        ));
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("KDC address `{kdc}` has no host"),
        ));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("KDC address `{kdc}` must not carry credentials"),
        ));
    }

    if !(url.path().is_empty() || url.path() == "/") || url.query().is_some() || url.fragment().is_some() {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("KDC address `{kdc}` must be host[:port]"),
        ));
    }

    match url.port() {
        Some(0) => {
            return Err(Error::new(
                ErrorKind::InvalidConfiguration,
                format!("KDC address `{kdc}` has an invalid port"),
            ))
        }
        Some(_) => {}
        None => url
            .set_port(Some(DEFAULT_KDC_PORT))
            .map_err(|_| Error::new(ErrorKind::InvalidConfiguration, format!("unable to set port on `{kdc}`")))?,
    }

    Ok(url)
}
