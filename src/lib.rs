#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

mod cancellation;
mod error;
mod issuer;
mod kdc;
pub mod kerberos;
pub mod negotiate;
pub mod network_client;
mod request;
mod secret;
mod token;

pub use cancellation::{CancellationToken, CancellationTokenExt};
pub use error::{Error, ErrorCategory, ErrorKind, Result, Stage};
pub use issuer::{issue_token, IssuerSettings, SecurityProvider, TokenIssuer};
pub use kerberos::{
    AuthenticatedSession, KerberosConfig, KerberosConfigBuilder, KerberosProvider, PreAuthMode, ServiceCredential,
    SessionKey,
};
pub use negotiate::SpnegoToken;
pub use request::{AuthenticationRequest, TokenResult};
pub use secret::Secret;
pub use token::{encode_token, token_id};
