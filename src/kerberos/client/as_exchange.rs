use picky_krb::constants::error_codes::{KDC_ERR_PREAUTH_FAILED, KDC_ERR_PREAUTH_REQUIRED};
use picky_krb::data_types::{KrbResult, ResultExt};
use picky_krb::messages::{AsRep, KdcRep};

use crate::error::{describe_krb_error, krb_error_code};
use crate::kdc::send_to_kdc;
use crate::kerberos::client::extractors::{
    check_reply_nonce, decrypt_as_rep, extract_etype_info_from_as_rep, extract_etype_info_from_krb_error,
};
use crate::kerberos::client::generators::{generate_as_req, generate_as_req_kdc_body, GenerateAsReqOptions};
use crate::kerberos::pa_datas::{verify_fast_negotiation, AsReqPaDataOptions, FastNegotiationResult};
use crate::kerberos::utils::{frame_message, generate_nonce, unframe_reply};
use crate::kerberos::{AuthenticatedSession, KerberosConfig, PreAuthMode, SessionKey};
use crate::network_client::NetworkClient;
use crate::{CancellationToken, Error, ErrorKind, Result, Secret};

/// The first request plus at most one salt/etype correction.
const MAX_AS_REQ_ATTEMPTS: usize = 2;

/// Performs AS exchange as specified in [RFC 4210: The Authentication Service Exchange](https://www.rfc-editor.org/rfc/rfc4120#section-3.1).
///
/// Pre-authentication is always sent with the first request. When the KDC answers PREAUTH_REQUIRED or
/// PREAUTH_FAILED and advertises a different salt or etype in PA-ETYPE-INFO2, the request is re-sent once
/// with the advertised parameters.
#[instrument(level = "debug", skip(network_client, config, password, cancellation), fields(realm = %config.realm()))]
pub fn as_exchange(
    network_client: &dyn NetworkClient,
    config: &KerberosConfig,
    username: &str,
    password: &Secret<String>,
    mode: PreAuthMode,
    cancellation: &CancellationToken,
) -> Result<AuthenticatedSession> {
    let nonce = generate_nonce();
    let kdc_req_body = generate_as_req_kdc_body(&GenerateAsReqOptions {
        realm: config.realm(),
        username,
        nonce,
    })?;

    let mut pa_data_options = AsReqPaDataOptions::new(password, config.realm(), username, mode);

    for attempt in 1..=MAX_AS_REQ_ATTEMPTS {
        let as_req = generate_as_req(pa_data_options.generate()?, kdc_req_body.clone());
        let encoded_as_req = picky_asn1_der::to_vec(&as_req)?;

        let response = send_to_kdc(network_client, config, &frame_message(&encoded_as_req), cancellation)?;

        let mut d = picky_asn1_der::Deserializer::new_from_bytes(unframe_reply(&response)?);
        let as_rep: KrbResult<AsRep> = KrbResult::deserialize(&mut d)?;

        let krb_error = match as_rep {
            Ok(as_rep) => {
                return finish_as_exchange(as_rep, &encoded_as_req, &mut pa_data_options, config, nonce);
            }
            Err(krb_error) => krb_error,
        };

        let error_code = krb_error_code(&krb_error);
        let can_retry = attempt < MAX_AS_REQ_ATTEMPTS
            && (error_code == KDC_ERR_PREAUTH_REQUIRED || error_code == KDC_ERR_PREAUTH_FAILED);

        if can_retry {
            if let Some(etype_info) = extract_etype_info_from_krb_error(&krb_error)? {
                if pa_data_options.with_etype_info(&etype_info) {
                    debug!(?etype_info.cipher, "KDC advertised different encryption parameters, resending AS-REQ");
                    continue;
                }
            }
        }

        error!(error = %describe_krb_error(&krb_error), "AS exchange error");

        return Err(Error::from(krb_error));
    }

    Err(Error::new(
        ErrorKind::KdcRejected,
        "the KDC kept requesting pre-authentication",
    ))
}

fn finish_as_exchange(
    as_rep: AsRep,
    encoded_as_req: &[u8],
    pa_data_options: &mut AsReqPaDataOptions<'_>,
    config: &KerberosConfig,
    nonce: u32,
) -> Result<AuthenticatedSession> {
    if let Some(etype_info) = extract_etype_info_from_as_rep(&as_rep)? {
        pa_data_options.with_etype_info(&etype_info);
    }

    let client_key = pa_data_options.client_key()?;
    let mut enc_part = decrypt_as_rep(&as_rep, client_key.as_ref(), pa_data_options.cipher())?;
    let session_key = SessionKey::take_encryption_key(&mut enc_part.key.0)?;

    check_reply_nonce(&enc_part, nonce, ErrorKind::KdcRejected)?;

    let fast = match pa_data_options.mode() {
        PreAuthMode::FastNegotiation => verify_fast_negotiation(&enc_part, encoded_as_req, client_key.as_ref())?,
        PreAuthMode::EncryptedTimestamp => FastNegotiationResult::default(),
    };

    let KdcRep {
        crealm, cname, ticket, ..
    } = as_rep.0;

    let session = AuthenticatedSession::new(
        config.realm().to_owned(),
        crealm.0,
        cname.0,
        ticket.0,
        session_key,
        pa_data_options.mode(),
        fast.fast_advertised,
    );

    info!(
        client = %session.client_principal(),
        request_verified = fast.request_verified,
        fast_advertised = fast.fast_advertised,
        "AS exchange finished successfully"
    );

    Ok(session)
}
