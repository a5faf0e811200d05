use std::time::Duration;

use crate::kerberos::{KerberosConfig, KerberosConfigBuilder, KerberosProvider, DEFAULT_KDC_TIMEOUT};
use crate::negotiate::SpnegoToken;
use crate::request::{AuthenticationRequest, TokenResult};
use crate::token::{encode_token, token_id};
use crate::{CancellationToken, CancellationTokenExt, Result, Stage};

/// The authentication protocol behind a [`TokenIssuer`].
///
/// Each method is one stage of a token request. Implementations hold no per-request state:
/// everything a later stage needs travels in the returned session and credential values.
pub trait SecurityProvider: Send + Sync {
    /// Ticket-granting material. Dropped as soon as the service credential is acquired.
    type Session;
    /// Credential for one target service.
    type Credential;

    fn authenticate(
        &self,
        request: &AuthenticationRequest,
        config: &KerberosConfig,
        cancellation: &CancellationToken,
    ) -> Result<Self::Session>;

    fn acquire_service_credential(
        &self,
        session: &Self::Session,
        service: &str,
        config: &KerberosConfig,
        cancellation: &CancellationToken,
    ) -> Result<Self::Credential>;

    fn init_security_context(&self, credential: &Self::Credential) -> Result<SpnegoToken>;
}

/// Settings shared by all requests of a [`TokenIssuer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerSettings {
    /// Bound on connecting to, writing to and reading from one KDC address.
    pub kdc_timeout: Duration,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            kdc_timeout: DEFAULT_KDC_TIMEOUT,
        }
    }
}

/// Issues SPNEGO tokens: configuration, authentication, service ticket, security context, encoding.
///
/// Holds no mutable state and can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer<P = KerberosProvider> {
    provider: P,
    settings: IssuerSettings,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: SecurityProvider> TokenIssuer<P> {
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            settings: IssuerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: IssuerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    pub fn issue_token(&self, request: &AuthenticationRequest) -> Result<TokenResult> {
        self.issue_token_with_cancellation(request, &CancellationToken::new())
    }

    /// Runs one request. The first failing stage ends it; its error is tagged with that [`Stage`].
    #[instrument(level = "info", skip_all, fields(username = request.username(), realm = request.realm(), service = request.service()))]
    pub fn issue_token_with_cancellation(
        &self,
        request: &AuthenticationRequest,
        cancellation: &CancellationToken,
    ) -> Result<TokenResult> {
        let config = run_stage(Stage::Configuration, cancellation, || {
            KerberosConfigBuilder::new(request.realm(), request.kdc())
                .with_timeout(self.settings.kdc_timeout)
                .build()
        })?;

        let session = run_stage(Stage::Authentication, cancellation, || {
            self.provider.authenticate(request, &config, cancellation)
        })?;

        let credential = run_stage(Stage::ServiceTicket, cancellation, || {
            self.provider
                .acquire_service_credential(&session, request.service(), &config, cancellation)
        });
        // the TGT is not needed past this point, whatever the outcome
        drop(session);
        let credential = credential?;

        let token = run_stage(Stage::ContextInitialization, cancellation, || {
            self.provider.init_security_context(&credential)
        })?;
        drop(credential);

        let encoded = run_stage(Stage::Encoding, cancellation, || encode_token(&token))?;

        let id = token_id(request.username(), request.realm());
        info!(%id, "token issued");

        Ok(TokenResult::new(encoded, id))
    }
}

fn run_stage<T>(stage: Stage, cancellation: &CancellationToken, f: impl FnOnce() -> Result<T>) -> Result<T> {
    cancellation.check().and_then(|_| f()).map_err(|err| {
        let err = err.in_stage(stage);
        warn!(%stage, error = %err, "token request failed");
        err
    })
}

/// Issues a token with the default [`KerberosProvider`] and settings.
pub fn issue_token(request: &AuthenticationRequest) -> Result<TokenResult> {
    TokenIssuer::new().issue_token(request)
}
