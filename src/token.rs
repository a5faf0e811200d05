use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::negotiate::SpnegoToken;
use crate::{Error, ErrorKind, Result, Secret};

/// DER-marshals the token and encodes it with the standard base64 alphabet, padded.
pub fn encode_token(token: &SpnegoToken) -> Result<Secret<String>> {
    let encoded = token.to_der().map_err(|err| {
        error!(error = %err, service = token.service(), "unable to marshal the SPNEGO token");

        Error::new(ErrorKind::EncodingFailed, err.description)
    })?;

    let encoded = Secret::new(encoded);

    Ok(Secret::new(STANDARD.encode(encoded.as_ref())))
}

/// Identifier of an issued token: `<username>@<realm>`.
pub fn token_id(username: &str, realm: &str) -> String {
    format!("{}@{}", username, realm)
}
