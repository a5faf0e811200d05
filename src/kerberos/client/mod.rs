mod as_exchange;
pub mod extractors;
pub mod generators;
mod tgs_exchange;

pub use as_exchange::as_exchange;
use picky_krb::constants::gss_api::AUTHENTICATOR_CHECKSUM_TYPE;
use picky_krb::messages::ApReq;
use rand::rngs::OsRng;
use rand::Rng;
pub use tgs_exchange::tgs_exchange;

use self::generators::{
    generate_ap_req, generate_authenticator, wipe_authenticator_sub_key, ChecksumOptions, ChecksumValues, EncKey,
    GenerateAuthenticatorOptions, GssFlags,
};
use crate::kerberos::flags::ApOptions;
use crate::kerberos::utils::generate_random_symmetric_key;
use crate::kerberos::ServiceCredential;
use crate::Result;

/// Builds the initiator AP-REQ for the service ticket of `credential`.
///
/// The authenticator carries the GSS checksum (RFC 4121 4.1.1) with integrity and confidentiality flags,
/// a fresh sub-session key and a random sequence number. Mutual authentication is not requested:
/// the token is single-leg and no AP-REP is ever processed.
#[instrument(level = "debug", skip_all, fields(service = credential.service()))]
pub fn initialize_security_context(credential: &ServiceCredential) -> Result<ApReq> {
    let session_key = credential.session_key();
    let enc_type = session_key.cipher();

    let authenticator_sub_key = generate_random_symmetric_key(enc_type)?;

    let flags = GssFlags::initiator_default();
    info!(?flags, "ApReq Authenticator checksum flags");

    let mut checksum_value = ChecksumValues::default();
    checksum_value.set_flags(flags);

    let mut authenticator = generate_authenticator(GenerateAuthenticatorOptions {
        crealm: credential.client_realm(),
        cname: credential.client_name(),
        seq_num: Some(OsRng.gen::<u32>()),
        sub_key: Some(EncKey {
            key_type: enc_type.clone(),
            key_value: authenticator_sub_key,
        }),
        checksum: Some(ChecksumOptions {
            checksum_type: AUTHENTICATOR_CHECKSUM_TYPE.to_vec(),
            checksum_value,
        }),
    })?;

    let ap_req = generate_ap_req(
        credential.ticket().clone(),
        session_key,
        &authenticator,
        ApOptions::empty(),
    );
    wipe_authenticator_sub_key(&mut authenticator);

    ap_req
}
