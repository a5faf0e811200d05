use picky_asn1::wrapper::{Asn1SequenceOf, IntegerAsn1};
use picky_krb::constants::key_usages::{AS_REP_ENC, TGS_REP_ENC_SESSION_KEY};
use picky_krb::constants::types::PA_ETYPE_INFO2_TYPE;
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{EtypeInfo2, PaData};
use picky_krb::messages::{AsRep, EncAsRepPart, EncKdcRepPart, EncTgsRepPart, KrbError, TgsRep};
use zeroize::Zeroizing;

use crate::kerberos::utils::integer_to_u32;
use crate::kerberos::SessionKey;
use crate::{Error, ErrorKind, Result};

/// Encryption parameters advertised by the KDC in PA-ETYPE-INFO2.
#[derive(Debug, Clone)]
pub struct EtypeInfo {
    pub cipher: CipherSuite,
    pub salt: Option<String>,
}

/// Maps an etype number to one of the ciphers we can derive password keys for.
pub(crate) fn supported_cipher(etype: &IntegerAsn1) -> Option<CipherSuite> {
    let etype = integer_to_u32(etype)?;

    match CipherSuite::try_from(etype as usize) {
        Ok(cipher @ (CipherSuite::Aes256CtsHmacSha196 | CipherSuite::Aes128CtsHmacSha196)) => Some(cipher),
        _ => None,
    }
}

fn etype_info_from_pa_datas(pa_datas: &[PaData]) -> Result<Option<EtypeInfo>> {
    let Some(pa_etype_info_2) = pa_datas
        .iter()
        .find(|pa_data| pa_data.padata_type.0 .0 == PA_ETYPE_INFO2_TYPE)
    else {
        return Ok(None);
    };

    let etype_info_2: EtypeInfo2 = picky_asn1_der::from_bytes(&pa_etype_info_2.padata_data.0 .0)?;

    // entries are in KDC preference order, the first one we support wins
    Ok(etype_info_2.0.iter().find_map(|entry| {
        supported_cipher(&entry.etype.0).map(|cipher| EtypeInfo {
            cipher,
            salt: entry.salt.0.as_ref().map(|salt| salt.0.to_string()),
        })
    }))
}

/// Extracts PA-ETYPE-INFO2 from the METHOD-DATA of a PREAUTH_REQUIRED / PREAUTH_FAILED error.
pub fn extract_etype_info_from_krb_error(error: &KrbError) -> Result<Option<EtypeInfo>> {
    trace!(?error, "KRB_ERROR");

    let Some(e_data) = error.0.e_data.0.as_ref() else {
        return Ok(None);
    };

    // e-data of other error codes is not METHOD-DATA
    let pa_datas: Asn1SequenceOf<PaData> = match picky_asn1_der::from_bytes(&e_data.0 .0) {
        Ok(pa_datas) => pa_datas,
        Err(err) => {
            debug!(%err, "KRB_ERROR e-data is not METHOD-DATA");
            return Ok(None);
        }
    };

    etype_info_from_pa_datas(&pa_datas.0)
}

/// Encryption parameters of the AS-REP reply key: PA-ETYPE-INFO2 first, the enc-part etype otherwise.
#[instrument(level = "trace", ret, skip_all)]
pub fn extract_etype_info_from_as_rep(as_rep: &AsRep) -> Result<Option<EtypeInfo>> {
    if let Some(pa_datas) = as_rep.0.padata.0.as_ref() {
        if let Some(etype_info) = etype_info_from_pa_datas(&pa_datas.0 .0)? {
            return Ok(Some(etype_info));
        }
    }

    Ok(supported_cipher(&as_rep.0.enc_part.0.etype.0).map(|cipher| EtypeInfo { cipher, salt: None }))
}

fn decode_enc_kdc_rep_part(data: &[u8]) -> Result<EncKdcRepPart> {
    // Windows KDCs may tag the AS-REP encrypted part as EncTGSRepPart
    match picky_asn1_der::from_bytes::<EncAsRepPart>(data) {
        Ok(enc_part) => Ok(enc_part.0),
        Err(_) => Ok(picky_asn1_der::from_bytes::<EncTgsRepPart>(data)?.0),
    }
}

/// Decrypts the AS-REP encrypted part with the client key. Failure means the password (or salt) is wrong.
#[instrument(level = "trace", skip_all, fields(cipher = ?cipher))]
pub fn decrypt_as_rep(as_rep: &AsRep, client_key: &[u8], cipher: &CipherSuite) -> Result<EncKdcRepPart> {
    let enc_data = cipher
        .cipher()
        .decrypt(client_key, AS_REP_ENC, &as_rep.0.enc_part.0.cipher.0 .0)
        .map(Zeroizing::new)
        .map_err(|err| {
            Error::new(
                ErrorKind::PreAuthFailed,
                format!("unable to decrypt the AS-REP with the password derived key: {:?}", err),
            )
        })?;

    decode_enc_kdc_rep_part(&enc_data)
}

/// Decrypts the TGS-REP encrypted part with the TGS session key.
#[instrument(level = "trace", skip_all)]
pub fn decrypt_tgs_rep(tgs_rep: &TgsRep, session_key: &SessionKey) -> Result<EncKdcRepPart> {
    let enc_data = session_key
        .cipher()
        .cipher()
        .decrypt(
            session_key.key().as_ref(),
            TGS_REP_ENC_SESSION_KEY,
            &tgs_rep.0.enc_part.0.cipher.0 .0,
        )
        .map(Zeroizing::new)
        .map_err(|err| {
            Error::new(
                ErrorKind::ServiceTicketUnavailable,
                format!("unable to decrypt the TGS-REP: {:?}", err),
            )
        })?;

    decode_enc_kdc_rep_part(&enc_data)
}

/// The reply must echo the nonce of the request.
pub fn check_reply_nonce(enc_part: &EncKdcRepPart, expected: u32, kind: ErrorKind) -> Result<()> {
    match integer_to_u32(&enc_part.nonce.0) {
        Some(nonce) if nonce == expected => Ok(()),
        nonce => Err(Error::new(
            kind,
            format!("reply nonce {:?} does not match the request nonce {}", nonce, expected),
        )),
    }
}
