use picky_krb::crypto::{CipherSuite, ChecksumSuite};
use picky_krb::data_types::{Checksum, PaData};
use picky_krb::messages::EncKdcRepPart;

use super::client::extractors::EtypeInfo;
use super::client::generators::{generate_pa_datas_for_as_req, GenerateAsPaDataOptions};
use super::utils::integer_to_u32;
use super::{PreAuthMode, DEFAULT_ENCRYPTION_TYPE};
use crate::{Error, ErrorKind, Result, Secret};

/// [RFC 6806: Negotiation of FAST and Detecting Modified Requests](https://www.rfc-editor.org/rfc/rfc6806#section-11)
const PA_REQ_ENC_PA_REP: u32 = 149;
/// [RFC 6113: PA-FX-FAST](https://www.rfc-editor.org/rfc/rfc6113#section-5.4.2)
const PA_FX_FAST: u32 = 136;
/// KEY_USAGE_AS_REQ, the usage of the PA-REQ-ENC-PA-REP checksum.
const AS_REQ_CHECKSUM_KEY_USAGE: i32 = 56;
/// [RFC 6806: enc-pa-rep ticket flag](https://www.rfc-editor.org/rfc/rfc6806#section-11)
const ENC_PA_REP_FLAG_BIT: usize = 15;

/// Pre-authentication parameters of the AS-REQ: password, salt, encryption type and mode.
///
/// The salt and etype start from the defaults (`REALM || username`, AES256) and can be corrected
/// once from the PA-ETYPE-INFO2 the KDC returns.
#[derive(Debug)]
pub struct AsReqPaDataOptions<'a> {
    inner: GenerateAsPaDataOptions<'a>,
}

impl<'a> AsReqPaDataOptions<'a> {
    pub fn new(password: &'a Secret<String>, realm: &str, username: &str, mode: PreAuthMode) -> Self {
        Self {
            inner: GenerateAsPaDataOptions {
                password,
                salt: format!("{realm}{username}").into_bytes(),
                cipher: DEFAULT_ENCRYPTION_TYPE,
                mode,
            },
        }
    }

    pub fn generate(&self) -> Result<Vec<PaData>> {
        generate_pa_datas_for_as_req(&self.inner)
    }

    pub fn cipher(&self) -> &CipherSuite {
        &self.inner.cipher
    }

    pub fn mode(&self) -> PreAuthMode {
        self.inner.mode
    }

    /// Applies the KDC advertised encryption parameters. Returns `true` when they differ from the current ones.
    pub fn with_etype_info(&mut self, etype_info: &EtypeInfo) -> bool {
        let mut changed = false;

        if u8::from(etype_info.cipher.clone()) != u8::from(self.inner.cipher.clone()) {
            self.inner.cipher = etype_info.cipher.clone();
            changed = true;
        }

        if let Some(salt) = etype_info.salt.as_ref() {
            if salt.as_bytes() != self.inner.salt.as_slice() {
                self.inner.salt = salt.as_bytes().to_vec();
                changed = true;
            }
        }

        changed
    }

    /// Derives the client long-term key, which is also the AS reply key.
    pub fn client_key(&self) -> Result<Secret<Vec<u8>>> {
        let key = self
            .inner
            .cipher
            .cipher()
            .generate_key_from_password(self.inner.password.as_str().as_bytes(), &self.inner.salt)?;

        Ok(Secret::new(key))
    }
}

/// What the KDC told us in the encrypted pa-data of the AS-REP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FastNegotiationResult {
    /// PA-REQ-ENC-PA-REP was present and its checksum matched the request we sent.
    pub request_verified: bool,
    /// PA-FX-FAST was present: the KDC supports FAST armoring.
    pub fast_advertised: bool,
}

/// Verifies the PA-REQ-ENC-PA-REP checksum over the exact AS-REQ bytes and looks for PA-FX-FAST.
///
/// A KDC that ignores the negotiation returns no encrypted pa-data; that is not an error.
/// A checksum that does not match means the request was modified on the way.
/// A reply carrying the enc-pa-rep flag must also carry the checksum: the flag without it
/// means the encrypted pa-data was stripped.
#[instrument(level = "debug", skip_all)]
pub fn verify_fast_negotiation(
    enc_part: &EncKdcRepPart,
    as_req: &[u8],
    reply_key: &[u8],
) -> Result<FastNegotiationResult> {
    let mut result = FastNegotiationResult::default();

    match enc_part.encrypted_pa_data.0.as_ref() {
        Some(pa_datas) => {
            for pa_data in &pa_datas.0 .0 {
                match integer_to_u32(&pa_data.padata_type.0) {
                    Some(PA_REQ_ENC_PA_REP) => {
                        let checksum: Checksum = picky_asn1_der::from_bytes(&pa_data.padata_data.0 .0)?;
                        verify_request_checksum(&checksum, as_req, reply_key)?;
                        result.request_verified = true;
                    }
                    Some(PA_FX_FAST) => result.fast_advertised = true,
                    _ => {}
                }
            }
        }
        None => debug!("KDC returned no encrypted pa-data"),
    }

    let enc_pa_rep = enc_part.flags.0.is_set(ENC_PA_REP_FLAG_BIT);

    if enc_pa_rep && !result.request_verified {
        error!("enc-pa-rep flag is set but the reply has no PA-REQ-ENC-PA-REP");

        return Err(Error::new(
            ErrorKind::KdcRejected,
            "enc-pa-rep flag is set without a PA-REQ-ENC-PA-REP checksum",
        ));
    }

    if result.request_verified && !enc_pa_rep {
        debug!("PA-REQ-ENC-PA-REP verified but the enc-pa-rep flag is not set");
    }

    debug!(?result, "FAST negotiation");

    Ok(result)
}

fn verify_request_checksum(checksum: &Checksum, as_req: &[u8], reply_key: &[u8]) -> Result<()> {
    let checksum_type = integer_to_u32(&checksum.cksumtype.0)
        .ok_or_else(|| Error::new(ErrorKind::KdcRejected, "invalid PA-REQ-ENC-PA-REP checksum type"))?;
    let checksum_suite = ChecksumSuite::try_from(checksum_type as usize).map_err(|_| {
        Error::new(
            ErrorKind::KdcRejected,
            format!("unsupported PA-REQ-ENC-PA-REP checksum type: {checksum_type}"),
        )
    })?;

    let expected = checksum_suite
        .hasher()
        .checksum(reply_key, AS_REQ_CHECKSUM_KEY_USAGE, as_req)?;

    if expected != checksum.checksum.0 .0 {
        error!("PA-REQ-ENC-PA-REP checksum mismatch: the AS-REQ was modified in transit");

        return Err(Error::new(
            ErrorKind::KdcRejected,
            "PA-REQ-ENC-PA-REP checksum does not match the sent AS-REQ",
        ));
    }

    Ok(())
}
