use picky_krb::constants::error_codes::KRB_ERR_RESPONSE_TOO_BIG;
use picky_krb::messages::KrbError;
use url::Url;

use crate::error::krb_error_code;
use crate::kerberos::utils::unframe_reply;
use crate::kerberos::KerberosConfig;
use crate::network_client::{NetworkClient, NetworkProtocol, NetworkRequest};
use crate::{CancellationToken, CancellationTokenExt, Error, ErrorKind, Result};

/// Sends a length-prefixed Kerberos message to the realm's KDCs, in configuration order.
///
/// An address that is unreachable or times out is skipped. Any reply, including a KRB-ERROR,
/// ends the walk. A UDP reply carrying KRB_ERR_RESPONSE_TOO_BIG is retried once over TCP
/// against the same host.
#[instrument(level = "debug", skip_all, fields(realm = %config.realm()))]
pub(crate) fn send_to_kdc(
    network_client: &dyn NetworkClient,
    config: &KerberosConfig,
    message: &[u8],
    cancellation: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut failures = Vec::new();

    for kdc_url in config.kdc_urls() {
        cancellation.check()?;

        match send_to_address(network_client, config, kdc_url, message, cancellation) {
            Ok(response) => return Ok(response),
            Err(err) if err.error_type == ErrorKind::KdcUnreachable => {
                warn!(url = %kdc_url, error = %err.description, "KDC is unreachable");
                failures.push(err.description);
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::new(
        ErrorKind::KdcUnreachable,
        format!(
            "no KDC of realm {} answered: {}",
            config.realm(),
            failures.join("; ")
        ),
    ))
}

fn send_to_address(
    network_client: &dyn NetworkClient,
    config: &KerberosConfig,
    kdc_url: &Url,
    message: &[u8],
    cancellation: &CancellationToken,
) -> Result<Vec<u8>> {
    let protocol = NetworkProtocol::from_url_scheme(kdc_url.scheme()).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfiguration,
            format!("Invalid protocol `{}` for KDC server", kdc_url.scheme()),
        )
    })?;

    let request = NetworkRequest {
        protocol,
        url: kdc_url.clone(),
        data: message.to_vec(),
        timeout: config.timeout(),
    };
    let response = network_client.send(&request, cancellation)?;
    unframe_reply(&response)?;

    if protocol == NetworkProtocol::Udp && is_response_too_big(&response) {
        debug!(url = %kdc_url, "KDC reply does not fit into a datagram, retrying over TCP");

        let mut tcp_url = kdc_url.clone();
        tcp_url
            .set_scheme("tcp")
            .map_err(|_| Error::new(ErrorKind::InternalError, format!("unable to switch {kdc_url} to TCP")))?;

        let request = NetworkRequest {
            protocol: NetworkProtocol::Tcp,
            url: tcp_url,
            ..request
        };
        let response = network_client.send(&request, cancellation)?;
        unframe_reply(&response)?;

        return Ok(response);
    }

    Ok(response)
}

fn is_response_too_big(response: &[u8]) -> bool {
    response
        .get(4..)
        .and_then(|body| picky_asn1_der::from_bytes::<KrbError>(body).ok())
        .map(|krb_error| krb_error_code(&krb_error) == KRB_ERR_RESPONSE_TOO_BIG)
        .unwrap_or(false)
}
