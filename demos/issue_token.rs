use std::env;
use std::error::Error;

use kerberos_token::{AuthenticationRequest, TokenIssuer};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn var(name: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    env::var(name).map_err(|_| format!("{name} is not set").into())
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let disable_fast_negotiation = env::var("KRB_DISABLE_FAST_NEGOTIATION")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let request = AuthenticationRequest::new(
        var("KRB_USERNAME")?,
        var("KRB_PASSWORD")?,
        &var("KRB_REALM")?,
        var("KRB_SERVICE")?,
        var("KRB_KDC")?,
    )?
    .with_fast_negotiation_disabled(disable_fast_negotiation);

    let result = TokenIssuer::new().issue_token(&request)?;
    info!(id = result.id(), "token issued");

    println!("Authorization: Negotiate {}", result.token().as_str());

    Ok(())
}
