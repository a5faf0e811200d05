use picky_asn1::bit_string::BitString;
use picky_asn1::date::GeneralizedTime;
use picky_asn1::restricted_string::IA5String;
use picky_asn1::wrapper::{
    Asn1SequenceOf, ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3,
    ExplicitContextTag4, ExplicitContextTag5, ExplicitContextTag6, ExplicitContextTag7, ExplicitContextTag8,
    GeneralizedTimeAsn1, IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_asn1_x509::oids;
use picky_krb::constants::key_usages::{AP_REQ_AUTHENTICATOR, TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR};
use picky_krb::constants::types::{
    AP_REQ_MSG_TYPE, AS_REQ_MSG_TYPE, NT_PRINCIPAL, NT_SRV_INST, PA_ENC_TIMESTAMP, PA_ENC_TIMESTAMP_KEY_USAGE,
    PA_PAC_REQUEST_TYPE, PA_TGS_REQ_TYPE, TGS_REQ_MSG_TYPE,
};
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{
    ApOptions, Authenticator, AuthenticatorInner, Checksum, EncryptedData, EncryptionKey, KerbPaPacRequest,
    KerberosFlags, KerberosStringAsn1, KerberosTime, PaData, PaEncTsEnc, PrincipalName, Realm, Ticket,
};
use picky_krb::gss_api::{MechType, MechTypeList};
use picky_krb::messages::{ApReq, ApReqInner, AsReq, KdcReq, KdcReqBody, TgsReq};
use time::{Duration, OffsetDateTime};
use zeroize::{Zeroize, Zeroizing};

use crate::kerberos::flags::{ApOptions as ApOptionsFlags, KdcOptions};
use crate::kerberos::utils::u32_to_integer;
use crate::kerberos::{PreAuthMode, SessionKey, KERBEROS_VERSION, TGT_SERVICE_NAME};
use crate::{Result, Secret};

const TICKET_LIFETIME_HOURS: i64 = 10;

/// [Microseconds](https://www.rfc-editor.org/rfc/rfc4120#section-5.2.4).
/// The maximum microseconds value.
///
/// ```not_rust
/// Microseconds    ::= INTEGER (0..999999)
/// ```
pub const MAX_MICROSECONDS: u32 = 999_999;

/// [RFC 6806: Negotiation of FAST and Detecting Modified Requests](https://www.rfc-editor.org/rfc/rfc6806#section-11)
///
/// ```not_rust
/// PA-REQ-ENC-PA-REP    149
/// ```
pub const PA_REQ_ENC_PA_REP: [u8; 2] = [0x00, 0x95];

/// [RFC 4120: Key Usage Numbers](https://www.rfc-editor.org/rfc/rfc4120#section-7.5.1):
/// TGS-REQ PA-TGS-REQ padata AP-REQ Authenticator cksum, keyed with the TGS session key.
const TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR_CHECKSUM: i32 = 6;

/// [Authenticator Checksum](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1.1)
///
/// **Important**: the last 4 bytes are [Checksum Flags Field](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1.1.1).
/// This value should be set separately with [GssFlags].
pub const AUTHENTICATOR_DEFAULT_CHECKSUM: [u8; 24] = [
    0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];

fn kerberos_string(value: &str) -> Result<KerberosStringAsn1> {
    Ok(KerberosStringAsn1::from(IA5String::from_string(value.to_owned())?))
}

fn current_time() -> (OffsetDateTime, u32) {
    let current_date = OffsetDateTime::now_utc();
    let microseconds = current_date.microsecond().min(MAX_MICROSECONDS);

    (current_date, microseconds)
}

/// Parameters for generating pa-datas for [AsReq] message.
#[derive(Debug)]
pub struct GenerateAsPaDataOptions<'a> {
    pub password: &'a Secret<String>,
    /// Salt for deriving the encryption key.
    ///
    /// Defaults to `REALM || username`, replaced by the salt the KDC advertises in PA-ETYPE-INFO2.
    pub salt: Vec<u8>,
    pub cipher: CipherSuite,
    pub mode: PreAuthMode,
}

#[instrument(level = "trace", ret, skip_all, fields(options.cipher = ?options.cipher, options.mode = ?options.mode))]
pub fn generate_pa_datas_for_as_req(options: &GenerateAsPaDataOptions<'_>) -> Result<Vec<PaData>> {
    let GenerateAsPaDataOptions {
        password,
        salt,
        cipher: encryption_type,
        mode,
    } = options;

    let (current_date, microseconds) = current_time();

    let timestamp = PaEncTsEnc {
        patimestamp: ExplicitContextTag0::from(KerberosTime::from(GeneralizedTime::from(current_date))),
        pausec: Optional::from(Some(ExplicitContextTag1::from(u32_to_integer(microseconds)))),
    };
    let timestamp_bytes = picky_asn1_der::to_vec(&timestamp)?;

    let cipher = encryption_type.cipher();

    let key = Secret::new(cipher.generate_key_from_password(password.as_str().as_bytes(), salt)?);
    let encrypted_timestamp = cipher.encrypt(key.as_ref(), PA_ENC_TIMESTAMP_KEY_USAGE, &timestamp_bytes)?;

    trace!(?current_date, ?microseconds, ?encryption_type, "Encrypted timestamp params");

    let mut pa_datas = vec![
        PaData {
            padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_ENC_TIMESTAMP.to_vec())),
            padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(picky_asn1_der::to_vec(&EncryptedData {
                etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![encryption_type.clone().into()])),
                kvno: Optional::from(None),
                cipher: ExplicitContextTag2::from(OctetStringAsn1::from(encrypted_timestamp)),
            })?)),
        },
        PaData {
            padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_PAC_REQUEST_TYPE.to_vec())),
            padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(picky_asn1_der::to_vec(&KerbPaPacRequest {
                include_pac: ExplicitContextTag0::from(true),
            })?)),
        },
    ];

    if *mode == PreAuthMode::FastNegotiation {
        // The padata-value is empty: the KDC answers with a checksum over the whole request.
        pa_datas.push(PaData {
            padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_REQ_ENC_PA_REP.to_vec())),
            padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(Vec::new())),
        });
    }

    Ok(pa_datas)
}

/// Parameters for generating [AsReq].
#[derive(Debug)]
pub struct GenerateAsReqOptions<'a> {
    pub realm: &'a str,
    pub username: &'a str,
    pub nonce: u32,
}

#[instrument(level = "trace", ret)]
pub fn generate_as_req_kdc_body(options: &GenerateAsReqOptions<'_>) -> Result<KdcReqBody> {
    let GenerateAsReqOptions { realm, username, nonce } = options;

    let expiration_date = OffsetDateTime::now_utc() + Duration::hours(TICKET_LIFETIME_HOURS);

    Ok(KdcReqBody {
        kdc_options: ExplicitContextTag0::from(KerberosFlags::from(BitString::with_bytes(
            KdcOptions::as_req_default().to_wire_bytes(),
        ))),
        cname: Optional::from(Some(ExplicitContextTag1::from(PrincipalName {
            name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_PRINCIPAL])),
            name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(vec![kerberos_string(username)?])),
        }))),
        realm: ExplicitContextTag2::from(Realm::from(IA5String::from_string((*realm).into())?)),
        sname: Optional::from(Some(ExplicitContextTag3::from(PrincipalName {
            name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_SRV_INST])),
            name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(vec![
                kerberos_string(TGT_SERVICE_NAME)?,
                kerberos_string(realm)?,
            ])),
        }))),
        from: Optional::from(None),
        till: ExplicitContextTag5::from(GeneralizedTimeAsn1::from(GeneralizedTime::from(expiration_date))),
        rtime: Optional::from(None),
        nonce: ExplicitContextTag7::from(u32_to_integer(*nonce)),
        etype: ExplicitContextTag8::from(Asn1SequenceOf::from(vec![
            IntegerAsn1::from(vec![CipherSuite::Aes256CtsHmacSha196.into()]),
            IntegerAsn1::from(vec![CipherSuite::Aes128CtsHmacSha196.into()]),
        ])),
        addresses: Optional::from(None),
        enc_authorization_data: Optional::from(None),
        additional_tickets: Optional::from(None),
    })
}

#[instrument(level = "debug", ret, skip_all)]
pub fn generate_as_req(pa_datas: Vec<PaData>, kdc_req_body: KdcReqBody) -> AsReq {
    AsReq::from(KdcReq {
        pvno: ExplicitContextTag1::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag2::from(IntegerAsn1::from(vec![AS_REQ_MSG_TYPE])),
        padata: Optional::from(Some(ExplicitContextTag3::from(Asn1SequenceOf::from(pa_datas)))),
        req_body: ExplicitContextTag4::from(kdc_req_body),
    })
}

/// Parameters for generating [TgsReq].
#[derive(Debug)]
pub struct GenerateTgsReqOptions<'a> {
    pub realm: &'a str,
    /// Components of the NT-SRV-INST service principal, e.g. `["HTTP", "svc.example.com"]`.
    pub sname: &'a [String],
    pub session_key: &'a SessionKey,
    /// [Ticket] extracted from the [AsRep](picky_krb::messages::AsRep) message.
    pub ticket: Ticket,
    /// [Authenticator] to be included in [TgsReq] pa-data.
    pub authenticator: &'a mut Authenticator,
    pub nonce: u32,
}

#[instrument(level = "debug", ret, skip_all, fields(realm = options.realm, sname = ?options.sname))]
pub fn generate_tgs_req(options: GenerateTgsReqOptions<'_>) -> Result<TgsReq> {
    let GenerateTgsReqOptions {
        realm,
        sname,
        session_key,
        ticket,
        authenticator,
        nonce,
    } = options;

    let expiration_date = OffsetDateTime::now_utc() + Duration::hours(TICKET_LIFETIME_HOURS);

    let service_names = sname
        .iter()
        .map(|name| kerberos_string(name))
        .collect::<Result<Vec<_>>>()?;

    let req_body = KdcReqBody {
        kdc_options: ExplicitContextTag0::from(KerberosFlags::from(BitString::with_bytes(
            KdcOptions::tgs_req_default().to_wire_bytes(),
        ))),
        cname: Optional::from(None),
        realm: ExplicitContextTag2::from(Realm::from(IA5String::from_string(realm.to_owned())?)),
        sname: Optional::from(Some(ExplicitContextTag3::from(PrincipalName {
            name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_SRV_INST])),
            name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(service_names)),
        }))),
        from: Optional::from(None),
        till: ExplicitContextTag5::from(GeneralizedTimeAsn1::from(GeneralizedTime::from(expiration_date))),
        rtime: Optional::from(None),
        nonce: ExplicitContextTag7::from(u32_to_integer(nonce)),
        etype: ExplicitContextTag8::from(Asn1SequenceOf::from(vec![
            IntegerAsn1::from(vec![CipherSuite::Aes256CtsHmacSha196.into()]),
            IntegerAsn1::from(vec![CipherSuite::Aes128CtsHmacSha196.into()]),
        ])),
        addresses: Optional::from(None),
        enc_authorization_data: Optional::from(None),
        additional_tickets: Optional::from(None),
    };

    // Keyed checksum: KDCs reject the unkeyed RSA-MD5 body checksum.
    let checksum_suite = session_key.cipher().cipher().checksum_type();
    let checksum = checksum_suite.hasher().checksum(
        session_key.key().as_ref(),
        TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR_CHECKSUM,
        &picky_asn1_der::to_vec(&req_body)?,
    )?;

    authenticator.0.cksum = Optional::from(Some(ExplicitContextTag3::from(Checksum {
        cksumtype: ExplicitContextTag0::from(IntegerAsn1::from(vec![checksum_suite.into()])),
        checksum: ExplicitContextTag1::from(OctetStringAsn1::from(checksum)),
    })));

    let pa_tgs_req = PaData {
        padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_TGS_REQ_TYPE.to_vec())),
        padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(picky_asn1_der::to_vec(
            &generate_tgs_ap_req(ticket, session_key, authenticator)?,
        )?)),
    };

    Ok(TgsReq::from(KdcReq {
        pvno: ExplicitContextTag1::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag2::from(IntegerAsn1::from(vec![TGS_REQ_MSG_TYPE])),
        padata: Optional::from(Some(ExplicitContextTag3::from(Asn1SequenceOf::from(vec![pa_tgs_req])))),
        req_body: ExplicitContextTag4::from(req_body),
    }))
}

#[derive(Debug)]
pub struct ChecksumOptions {
    pub checksum_type: Vec<u8>,
    pub checksum_value: ChecksumValues,
}

#[derive(Debug)]
pub struct ChecksumValues {
    inner: Vec<u8>,
}

impl Default for ChecksumValues {
    fn default() -> Self {
        Self {
            inner: AUTHENTICATOR_DEFAULT_CHECKSUM.to_vec(),
        }
    }
}

impl From<ChecksumValues> for Vec<u8> {
    fn from(val: ChecksumValues) -> Self {
        val.inner
    }
}

impl ChecksumValues {
    pub(crate) fn set_flags(&mut self, flags: GssFlags) {
        let flag_bits = flags.bits();
        let flag_bytes = flag_bits.to_le_bytes();
        self.inner[20..24].copy_from_slice(&flag_bytes);
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.inner
    }
}

bitflags::bitflags! {
    /// The checksum "Flags" field is used to convey service options or extension negotiation information.
    /// More info:
    /// * https://datatracker.ietf.org/doc/html/rfc4121#section-4.1.1.1
    #[derive(Debug,Clone,Copy,PartialEq,Eq)]
    pub struct GssFlags: u32 {
        // [Checksum Flags Field](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1.1.1).
        const GSS_C_DELEG_FLAG      = 1;
        const GSS_C_MUTUAL_FLAG     = 2;
        const GSS_C_REPLAY_FLAG     = 4;
        const GSS_C_SEQUENCE_FLAG   = 8;
        const GSS_C_CONF_FLAG       = 16;
        const GSS_C_INTEG_FLAG      = 32;
    }
}

impl GssFlags {
    /// Flags requested by a single-leg initiator: no mutual authentication, no delegation.
    pub fn initiator_default() -> Self {
        GssFlags::GSS_C_CONF_FLAG | GssFlags::GSS_C_INTEG_FLAG
    }
}

/// Encryption key.
#[derive(Debug)]
pub struct EncKey {
    /// Encryption type.
    pub key_type: CipherSuite,
    /// Encryption key value.
    pub key_value: Secret<Vec<u8>>,
}

/// Input parameters for generating ApReq Authenticator.
#[derive(Debug)]
pub struct GenerateAuthenticatorOptions<'a> {
    /// Client realm, as returned by the KDC.
    pub crealm: &'a Realm,
    /// Client name, as returned by the KDC.
    pub cname: &'a PrincipalName,
    /// Sequence number.
    pub seq_num: Option<u32>,
    /// Sub-session encryption key.
    pub sub_key: Option<EncKey>,
    /// Authenticator checksum options.
    pub checksum: Option<ChecksumOptions>,
}

/// Generated ApReq Authenticator.
#[instrument(level = "trace", skip_all)]
pub fn generate_authenticator(options: GenerateAuthenticatorOptions<'_>) -> Result<Authenticator> {
    let GenerateAuthenticatorOptions {
        crealm,
        cname,
        seq_num,
        sub_key,
        checksum,
    } = options;

    let (current_date, microseconds) = current_time();

    let cksum = if let Some(ChecksumOptions {
        checksum_type,
        checksum_value,
    }) = checksum
    {
        Optional::from(Some(ExplicitContextTag3::from(Checksum {
            cksumtype: ExplicitContextTag0::from(IntegerAsn1::from(checksum_type)),
            checksum: ExplicitContextTag1::from(OctetStringAsn1::from(checksum_value.into_inner())),
        })))
    } else {
        Optional::from(None)
    };

    Ok(Authenticator::from(AuthenticatorInner {
        authenticator_vno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        crealm: ExplicitContextTag1::from(crealm.clone()),
        cname: ExplicitContextTag2::from(cname.clone()),
        cksum,
        cusec: ExplicitContextTag4::from(u32_to_integer(microseconds)),
        ctime: ExplicitContextTag5::from(KerberosTime::from(GeneralizedTime::from(current_date))),
        subkey: Optional::from(sub_key.map(|EncKey { key_type, key_value }| {
            ExplicitContextTag6::from(EncryptionKey {
                key_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![key_type.into()])),
                key_value: ExplicitContextTag1::from(OctetStringAsn1::from(key_value.as_ref().clone())),
            })
        })),
        seq_number: Optional::from(seq_num.map(|seq_num| ExplicitContextTag7::from(u32_to_integer(seq_num)))),
        authorization_data: Optional::from(None),
    }))
}

/// Zeroizes the sub-session key carried by an authenticator once it has been encrypted.
pub(crate) fn wipe_authenticator_sub_key(authenticator: &mut Authenticator) {
    if let Some(sub_key) = authenticator.0.subkey.0.as_mut() {
        sub_key.0.key_value.0 .0.zeroize();
    }
}

fn encrypt_authenticator(session_key: &SessionKey, key_usage: i32, authenticator: &Authenticator) -> Result<EncryptedData> {
    let encoded_authenticator = Zeroizing::new(picky_asn1_der::to_vec(&authenticator)?);
    let encrypted_authenticator =
        session_key
            .cipher()
            .cipher()
            .encrypt(session_key.key().as_ref(), key_usage, &encoded_authenticator)?;

    trace!(
        key_usage,
        encrypted_len = encrypted_authenticator.len(),
        "AP_REQ authenticator encrypted",
    );

    Ok(EncryptedData {
        etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![session_key.etype()])),
        kvno: Optional::from(None),
        cipher: ExplicitContextTag2::from(OctetStringAsn1::from(encrypted_authenticator)),
    })
}

pub fn generate_tgs_ap_req(ticket: Ticket, session_key: &SessionKey, authenticator: &Authenticator) -> Result<ApReq> {
    let authenticator = encrypt_authenticator(session_key, TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR, authenticator)?;

    Ok(ApReq::from(ApReqInner {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![AP_REQ_MSG_TYPE])),
        ap_options: ExplicitContextTag2::from(ApOptions::from(BitString::with_bytes(vec![
            // do not need any options when ap_req uses in tgs_req pa_data
            0x00, 0x00, 0x00, 0x00,
        ]))),
        ticket: ExplicitContextTag3::from(ticket),
        authenticator: ExplicitContextTag4::from(authenticator),
    }))
}

#[instrument(level = "trace", ret, skip_all)]
pub fn generate_ap_req(
    ticket: Ticket,
    session_key: &SessionKey,
    authenticator: &Authenticator,
    options: ApOptionsFlags,
) -> Result<ApReq> {
    let authenticator = encrypt_authenticator(session_key, AP_REQ_AUTHENTICATOR, authenticator)?;

    Ok(ApReq::from(ApReqInner {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![AP_REQ_MSG_TYPE])),
        ap_options: ExplicitContextTag2::from(ApOptions::from(BitString::with_bytes(
            options.bits().to_be_bytes().to_vec(),
        ))),
        ticket: ExplicitContextTag3::from(ticket),
        authenticator: ExplicitContextTag4::from(authenticator),
    }))
}

/// Mechanisms offered in the SPNEGO NegTokenInit, most preferred first.
pub fn get_mech_list() -> MechTypeList {
    MechTypeList::from(vec![MechType::from(oids::krb5()), MechType::from(oids::ms_krb5())])
}
