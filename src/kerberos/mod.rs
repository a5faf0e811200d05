pub mod client;
pub mod config;
pub mod flags;
pub mod pa_datas;
mod session;
pub(crate) mod utils;

pub use config::{
    normalize_realm, parse_kdc_url, KerberosConfig, KerberosConfigBuilder, DEFAULT_KDC_PORT, DEFAULT_KDC_TIMEOUT,
};
use picky_krb::crypto::CipherSuite;
pub use session::{AuthenticatedSession, PreAuthMode, ServiceCredential, SessionKey};
pub use utils::parse_service_principal;

use self::client::{as_exchange, initialize_security_context, tgs_exchange};
use crate::issuer::SecurityProvider;
use crate::negotiate::SpnegoToken;
use crate::network_client::{NetworkClient, StdNetworkClient};
use crate::request::AuthenticationRequest;
use crate::{CancellationToken, Result};

pub const KERBEROS_VERSION: u8 = 0x05;
pub const TGT_SERVICE_NAME: &str = "krbtgt";

pub const DEFAULT_ENCRYPTION_TYPE: CipherSuite = CipherSuite::Aes256CtsHmacSha196;

/// [`SecurityProvider`] speaking Kerberos V5 to the realm's KDCs.
///
/// Stateless: every call works on the values it is given, so one provider can serve any number of
/// concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct KerberosProvider<C = StdNetworkClient> {
    network_client: C,
}

impl KerberosProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: NetworkClient> KerberosProvider<C> {
    pub fn with_network_client(network_client: C) -> Self {
        Self { network_client }
    }

    pub fn network_client(&self) -> &C {
        &self.network_client
    }
}

impl<C: NetworkClient> SecurityProvider for KerberosProvider<C> {
    type Session = AuthenticatedSession;
    type Credential = ServiceCredential;

    fn authenticate(
        &self,
        request: &AuthenticationRequest,
        config: &KerberosConfig,
        cancellation: &CancellationToken,
    ) -> Result<AuthenticatedSession> {
        as_exchange(
            &self.network_client,
            config,
            request.username(),
            request.password(),
            PreAuthMode::from_options(request.disable_fast_negotiation()),
            cancellation,
        )
    }

    fn acquire_service_credential(
        &self,
        session: &AuthenticatedSession,
        service: &str,
        config: &KerberosConfig,
        cancellation: &CancellationToken,
    ) -> Result<ServiceCredential> {
        tgs_exchange(&self.network_client, config, session, service, cancellation)
    }

    fn init_security_context(&self, credential: &ServiceCredential) -> Result<SpnegoToken> {
        let ap_req = initialize_security_context(credential)?;

        SpnegoToken::from_ap_req(credential.service(), ap_req)
    }
}
