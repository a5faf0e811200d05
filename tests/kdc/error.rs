use picky_asn1::date::GeneralizedTime;
use picky_asn1::restricted_string::IA5String;
use picky_asn1::wrapper::{
    Asn1SequenceOf, ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag10, ExplicitContextTag11,
    ExplicitContextTag12, ExplicitContextTag2, ExplicitContextTag4, ExplicitContextTag5, ExplicitContextTag6,
    ExplicitContextTag7, ExplicitContextTag9, IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_asn1_der::Asn1DerError;
use picky_krb::constants::error_codes::{
    KDC_ERR_C_PRINCIPAL_UNKNOWN, KDC_ERR_ETYPE_NOSUPP, KDC_ERR_PREAUTH_FAILED, KDC_ERR_PREAUTH_REQUIRED,
    KDC_ERR_S_PRINCIPAL_UNKNOWN, KDC_ERR_WRONG_REALM, KRB_AP_ERR_BADVERSION, KRB_AP_ERR_MODIFIED,
    KRB_AP_ERR_MSG_TYPE, KRB_AP_ERR_SKEW, KRB_ERR_GENERIC,
};
use picky_krb::constants::types::{KRB_ERROR_MSG_TYPE, NT_SRV_INST, PA_ENC_TIMESTAMP, PA_ETYPE_INFO2_TYPE};
use picky_krb::crypto::CipherSuite;
use picky_krb::data_types::{EtypeInfo2Entry, KerberosStringAsn1, KerberosTime, Microseconds, PaData, PrincipalName};
use picky_krb::messages::{KrbError, KrbErrorInner};
use thiserror::Error;
use time::OffsetDateTime;

use super::{kerberos_string, KERBEROS_VERSION, TGT_SERVICE_NAME};

#[derive(Error, Debug)]
pub enum KdcError {
    #[error("KRB_AP_ERR_BADVERSION: got invalid Kerberos version ({0:?})")]
    BadKrbVersion(Vec<u8>),

    #[error("KRB_AP_ERR_MSG_TYPE: got invalid Kerberos message type ({0:?})")]
    BadMsgType(Vec<u8>),

    #[error("KDC_ERR_WRONG_REALM: wrong realm: {0}")]
    WrongRealm(String),

    #[error("ASN1 DER encoding failed: {0:?}")]
    Asn1Encode(#[from] Asn1DerError),

    #[error("encryption failed: {0:?}")]
    EncryptionFailed(#[from] picky_krb::crypto::KerberosCryptoError),

    #[error("KDC_ERR_C_PRINCIPAL_UNKNOWN: {0}")]
    ClientPrincipalUnknown(String),

    #[error("KDC_ERR_S_PRINCIPAL_UNKNOWN: {0}")]
    ServicePrincipalUnknown(String),

    #[error("KDC_ERR_ETYPE_NOSUPP: only AES256_CTS_HMAC_SHA1_96 and AES128_CTS_HMAC_SHA1_96 etypes are supported")]
    NoSuitableEtype,

    #[error("KDC_ERR_PREAUTH_FAILED: {0}")]
    PreAuthFailed(&'static str),

    #[error("KDC_ERR_PREAUTH_REQUIRED: {0}")]
    PreAuthRequired(&'static str),

    #[error("KRB_AP_ERR_SKEW: {0}")]
    ClockSkew(&'static str),

    #[error("KRB_AP_ERR_MODIFIED: {0}")]
    Modified(&'static str),
}

impl KdcError {
    fn error_code(&self) -> u32 {
        match self {
            KdcError::BadKrbVersion(_) => KRB_AP_ERR_BADVERSION,
            KdcError::BadMsgType(_) => KRB_AP_ERR_MSG_TYPE,
            KdcError::WrongRealm(_) => KDC_ERR_WRONG_REALM,
            KdcError::Asn1Encode(_) | KdcError::EncryptionFailed(_) => KRB_ERR_GENERIC,
            KdcError::ClientPrincipalUnknown(_) => KDC_ERR_C_PRINCIPAL_UNKNOWN,
            KdcError::ServicePrincipalUnknown(_) => KDC_ERR_S_PRINCIPAL_UNKNOWN,
            KdcError::NoSuitableEtype => KDC_ERR_ETYPE_NOSUPP,
            KdcError::PreAuthFailed(_) => KDC_ERR_PREAUTH_FAILED,
            KdcError::PreAuthRequired(_) => KDC_ERR_PREAUTH_REQUIRED,
            KdcError::ClockSkew(_) => KRB_AP_ERR_SKEW,
            KdcError::Modified(_) => KRB_AP_ERR_MODIFIED,
        }
    }

    /// Encodes the error as KRB-ERROR. Pre-authentication errors carry METHOD-DATA with the user's salt.
    pub fn into_krb_error(self, realm: &str, salt: Option<&str>) -> KrbError {
        let error_code = self.error_code();

        let method_data = match salt {
            Some(salt) if error_code == KDC_ERR_PREAUTH_FAILED || error_code == KDC_ERR_PREAUTH_REQUIRED => {
                let etype_info = picky_asn1_der::to_vec(&Asn1SequenceOf::from(vec![EtypeInfo2Entry {
                    etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![u8::from(
                        CipherSuite::Aes256CtsHmacSha196,
                    )])),
                    salt: Optional::from(Some(ExplicitContextTag1::from(kerberos_string(salt)))),
                    s2kparams: Optional::from(None),
                }]))
                .expect("ETYPE-INFO2 encoding");

                Some(vec![
                    PaData {
                        padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_ETYPE_INFO2_TYPE.to_vec())),
                        padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(etype_info)),
                    },
                    PaData {
                        padata_type: ExplicitContextTag1::from(IntegerAsn1::from(PA_ENC_TIMESTAMP.to_vec())),
                        padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(Vec::new())),
                    },
                ])
            }
            _ => None,
        };
        let e_data = method_data.map(|pa_datas| {
            ExplicitContextTag12::from(OctetStringAsn1::from(
                picky_asn1_der::to_vec(&Asn1SequenceOf::from(pa_datas)).expect("METHOD-DATA encoding"),
            ))
        });

        let current_date = OffsetDateTime::now_utc();
        // Microseconds    ::= INTEGER (0..999999)
        let microseconds = current_date.microsecond().min(999_999);
        let realm = kerberos_string(realm);

        KrbError::from(KrbErrorInner {
            pvno: ExplicitContextTag0::from(IntegerAsn1(vec![KERBEROS_VERSION])),
            msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![KRB_ERROR_MSG_TYPE])),
            ctime: Optional::from(None),
            cusec: Optional::from(None),
            stime: ExplicitContextTag4::from(KerberosTime::from(GeneralizedTime::from(current_date))),
            susec: ExplicitContextTag5::from(Microseconds::from(microseconds.to_be_bytes().to_vec())),
            error_code: ExplicitContextTag6::from(error_code),
            crealm: Optional::from(Some(ExplicitContextTag7::from(realm.clone()))),
            cname: Optional::from(None),
            realm: ExplicitContextTag9::from(realm.clone()),
            sname: ExplicitContextTag10::from(PrincipalName {
                name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![NT_SRV_INST])),
                name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(vec![
                    kerberos_string(TGT_SERVICE_NAME),
                    realm,
                ])),
            }),
            e_text: Optional::from(Some(ExplicitContextTag11::from(KerberosStringAsn1::from(
                IA5String::from_string(self.to_string()).expect("error message to be valid KerberosString"),
            )))),
            e_data: Optional::from(e_data),
        })
    }
}
