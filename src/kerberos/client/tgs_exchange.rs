use picky_krb::data_types::{KrbResult, ResultExt};
use picky_krb::messages::{KdcRep, TgsRep};

use crate::error::describe_krb_error;
use crate::kdc::send_to_kdc;
use crate::kerberos::client::extractors::{check_reply_nonce, decrypt_tgs_rep};
use crate::kerberos::client::generators::{
    generate_authenticator, generate_tgs_req, GenerateAuthenticatorOptions, GenerateTgsReqOptions,
};
use crate::kerberos::utils::{generate_nonce, parse_service_principal, serialize_message, unframe_reply};
use crate::kerberos::{AuthenticatedSession, KerberosConfig, ServiceCredential, SessionKey};
use crate::network_client::NetworkClient;
use crate::{CancellationToken, Error, ErrorKind, Result};

/// Requests a service ticket for `service` with the TGT of `session`.
///
/// [The Ticket-Granting Service (TGS) Exchange](https://www.rfc-editor.org/rfc/rfc4120#section-3.3)
#[instrument(level = "debug", skip(network_client, config, session, cancellation))]
pub fn tgs_exchange(
    network_client: &dyn NetworkClient,
    config: &KerberosConfig,
    session: &AuthenticatedSession,
    service: &str,
    cancellation: &CancellationToken,
) -> Result<ServiceCredential> {
    let sname = parse_service_principal(service)?;
    let nonce = generate_nonce();

    let mut authenticator = generate_authenticator(GenerateAuthenticatorOptions {
        crealm: session.client_realm(),
        cname: session.client_name(),
        seq_num: Some(generate_nonce()),
        sub_key: None,
        checksum: None,
    })?;

    let tgs_req = generate_tgs_req(GenerateTgsReqOptions {
        realm: session.realm(),
        sname: &sname,
        session_key: session.session_key(),
        ticket: session.ticket().clone(),
        authenticator: &mut authenticator,
        nonce,
    })?;

    let response = send_to_kdc(network_client, config, &serialize_message(&tgs_req)?, cancellation)?;

    let mut d = picky_asn1_der::Deserializer::new_from_bytes(unframe_reply(&response)?);
    let tgs_rep: KrbResult<TgsRep> = KrbResult::deserialize(&mut d)?;
    let tgs_rep = tgs_rep.map_err(|krb_error| {
        let description = describe_krb_error(&krb_error);
        error!(error = %description, service, "TGS exchange error");

        Error::new(ErrorKind::ServiceTicketUnavailable, description)
    })?;

    let mut enc_part = decrypt_tgs_rep(&tgs_rep, session.session_key())?;
    let session_key = SessionKey::take_encryption_key(&mut enc_part.key.0)?;
    check_reply_nonce(&enc_part, nonce, ErrorKind::ServiceTicketUnavailable)?;

    info!(service, "TGS exchange finished successfully");

    let KdcRep {
        crealm, cname, ticket, ..
    } = tgs_rep.0;

    Ok(ServiceCredential::new(
        service.to_owned(),
        crealm.0,
        cname.0,
        ticket.0,
        session_key,
    ))
}
