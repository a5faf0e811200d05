use std::time::Duration;

use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3, ExplicitContextTag4,
    ExplicitContextTag5, ExplicitContextTag6, IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_krb::constants::key_usages::{
    TGS_REP_ENC_SESSION_KEY, TGS_REP_ENC_SUB_KEY, TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR, TICKET_REP,
};
use picky_krb::constants::types::{ENC_TGS_REP_PART_TYPE, PA_TGS_REQ_TYPE, TGS_REP_MSG_TYPE, TGS_REQ_MSG_TYPE};
use picky_krb::crypto::{ChecksumSuite, CipherSuite};
use picky_krb::data_types::{Authenticator, EncTicketPart, EncTicketPartInner, EncryptedData, PaData, PrincipalName};
use picky_krb::messages::{ApReq, KdcRep, KdcReq, KdcReqBody, TgsRep, TgsReq};
use rand::rngs::OsRng;
use rand::RngCore;
use time::OffsetDateTime;

use super::config::KerberosServer;
use super::error::KdcError;
use super::ticket::{make_rep_enc_part, make_ticket, MakeTicketParams, RepEncPartParams};
use super::{sname_matches, ticket_times, KERBEROS_VERSION, TGT_SERVICE_NAME};

/// TGS-REQ PA-TGS-REQ padata AP-REQ Authenticator cksum.
const TGS_REQ_BODY_CHECKSUM_KEY_USAGE: i32 = 6;

/// Resulting data after the TGS pre-authentication.
struct TgsPreAuth {
    /// Key the TGS-REP encrypted part is sealed with.
    session_key: Vec<u8>,
    session_etype: CipherSuite,
    cname: PrincipalName,
    tgs_rep_key_usage: i32,
}

fn decrypt(etype: &IntegerAsn1, key: &[u8], key_usage: i32, data: &[u8]) -> Result<Vec<u8>, KdcError> {
    let cipher = CipherSuite::try_from(etype.0.as_slice())
        .map_err(|_| KdcError::NoSuitableEtype)?
        .cipher();

    Ok(cipher.decrypt(key, key_usage, data)?)
}

/// Validates the PA-TGS-REQ AP-REQ: TGT sealed with the krbtgt key, authenticator and body checksum.
fn tgs_preauth(req_body: &KdcReqBody, pa_datas: &[PaData], kdc_config: &KerberosServer) -> Result<TgsPreAuth, KdcError> {
    let ap_req: ApReq = picky_asn1_der::from_bytes(
        &pa_datas
            .iter()
            .find(|pa_data| pa_data.padata_type.0 .0 == PA_TGS_REQ_TYPE)
            .ok_or(KdcError::PreAuthRequired("missing PA_TGS_REQ pa-data"))?
            .padata_data
            .0
             .0,
    )
    .map_err(|_| KdcError::PreAuthFailed("failed to decode PA_TGS_REQ AP_REQ"))?;

    let ticket = &ap_req.0.ticket.0 .0;
    if !sname_matches(&ticket.sname.0, &[TGT_SERVICE_NAME, &kdc_config.realm]) {
        return Err(KdcError::ServicePrincipalUnknown("PA_TGS_REQ ticket is not a TGT".to_owned()));
    }

    let ticket_enc_data = &ticket.enc_part.0;
    let ticket_enc_part: EncTicketPart = picky_asn1_der::from_bytes(
        &decrypt(
            &ticket_enc_data.etype.0,
            &kdc_config.krbtgt_key,
            TICKET_REP,
            &ticket_enc_data.cipher.0 .0,
        )
        .map_err(|_| KdcError::Modified("TGS_REQ TGT ticket decryption failed"))?,
    )?;

    let EncTicketPartInner {
        key, cname, endtime, ..
    } = ticket_enc_part.0;

    let end_time = OffsetDateTime::try_from(endtime.0 .0).map_err(|_| KdcError::PreAuthFailed("invalid TGT end time"))?;
    if OffsetDateTime::now_utc() > end_time + Duration::from_secs(kdc_config.max_time_skew) {
        return Err(KdcError::PreAuthFailed("TGT ticket has expired"));
    }

    let session_etype = CipherSuite::try_from(key.0.key_type.0 .0.as_slice()).map_err(|_| KdcError::NoSuitableEtype)?;
    let session_key = key.0.key_value.0 .0;

    let authenticator_enc_data = &ap_req.0.authenticator.0;
    let authenticator: Authenticator = picky_asn1_der::from_bytes(
        &decrypt(
            &authenticator_enc_data.etype.0,
            &session_key,
            TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR,
            &authenticator_enc_data.cipher.0 .0,
        )
        .map_err(|_| KdcError::Modified("TGS_REQ authenticator decryption failed"))?,
    )?;

    let checksum = authenticator
        .0
        .cksum
        .0
        .as_ref()
        .ok_or(KdcError::PreAuthFailed("TGS_REQ authenticator has no body checksum"))?;
    let checksum_type = checksum
        .0
        .cksumtype
        .0
         .0
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
    let checksum_suite = ChecksumSuite::try_from(checksum_type)
        .map_err(|_| KdcError::PreAuthFailed("unsupported body checksum type"))?;
    let expected = checksum_suite.hasher().checksum(
        &session_key,
        TGS_REQ_BODY_CHECKSUM_KEY_USAGE,
        &picky_asn1_der::to_vec(req_body)?,
    )?;
    if expected != checksum.0.checksum.0 .0 {
        return Err(KdcError::Modified("TGS_REQ body checksum mismatch"));
    }

    let (session_key, tgs_rep_key_usage) = match authenticator.0.subkey.0 {
        Some(key) => (key.0.key_value.0 .0, TGS_REP_ENC_SUB_KEY),
        None => (session_key, TGS_REP_ENC_SESSION_KEY),
    };

    Ok(TgsPreAuth {
        session_key,
        session_etype,
        cname: cname.0,
        tgs_rep_key_usage,
    })
}

/// [The Ticket-Granting Service (TGS) Exchange](https://www.rfc-editor.org/rfc/rfc4120#section-3.3).
pub fn handle_tgs_req(tgs_req: &TgsReq, kdc_config: &KerberosServer) -> Result<TgsRep, KdcError> {
    let KdcReq {
        pvno,
        msg_type,
        padata,
        req_body,
    } = &tgs_req.0;

    if pvno.0 .0 != [KERBEROS_VERSION] {
        return Err(KdcError::BadKrbVersion(pvno.0 .0.clone()));
    }

    if msg_type.0 .0 != [TGS_REQ_MSG_TYPE] {
        return Err(KdcError::BadMsgType(msg_type.0 .0.clone()));
    }

    let realm = req_body.0.realm.0 .0.as_utf8();
    if !realm.eq_ignore_ascii_case(&kdc_config.realm) {
        return Err(KdcError::WrongRealm(realm.to_owned()));
    }

    let pa_datas = &padata
        .0
        .as_ref()
        .ok_or(KdcError::PreAuthRequired("TGS_REQ PA-DATA is missing"))?
        .0
         .0;
    let TgsPreAuth {
        session_key: reply_key,
        session_etype,
        cname,
        tgs_rep_key_usage,
    } = tgs_preauth(&req_body.0, pa_datas, kdc_config)?;

    let KdcReqBody {
        kdc_options,
        realm: realm_asn1,
        sname,
        till,
        nonce,
        etype,
        ..
    } = &req_body.0;

    let sname = sname
        .0
        .as_ref()
        .ok_or_else(|| KdcError::ServicePrincipalUnknown("sname is missing in TGS_REQ".to_owned()))?
        .0
        .clone();
    let service = kdc_config
        .services
        .iter()
        .find(|service| {
            let names = service.names.iter().map(String::as_str).collect::<Vec<_>>();
            sname_matches(&sname, &names)
        })
        .ok_or_else(|| {
            KdcError::ServicePrincipalUnknown(format!(
                "{} is not found in KDC database",
                sname
                    .name_string
                    .0
                     .0
                    .iter()
                    .map(|name| name.to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            ))
        })?;

    let etype = etype
        .0
         .0
        .iter()
        .find_map(|etype| CipherSuite::try_from(etype.0.as_slice()).ok())
        .ok_or(KdcError::NoSuitableEtype)?;
    let (auth_time, end_time) = ticket_times(&till.0);
    let realm = realm_asn1.0.clone();

    let mut session_key = vec![0; etype.cipher().key_size()];
    OsRng.fill_bytes(&mut session_key);

    // the reply is sealed with the TGS session key (or sub-key), so it uses that key's etype
    let tgs_rep_enc_part = make_rep_enc_part::<ENC_TGS_REP_PART_TYPE>(
        RepEncPartParams {
            etype: session_etype.clone(),
            session_key: session_key.clone(),
            nonce: nonce.0 .0.clone(),
            kdc_options: kdc_options.0.clone(),
            auth_time,
            end_time,
            realm: realm.clone(),
            sname: sname.clone(),
            encrypted_pa_data: None,
        },
        &reply_key,
        tgs_rep_key_usage,
    )?;

    Ok(TgsRep::from(KdcRep {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![TGS_REP_MSG_TYPE])),
        padata: Optional::from(None),
        crealm: ExplicitContextTag3::from(realm.clone()),
        cname: ExplicitContextTag4::from(cname.clone()),
        ticket: ExplicitContextTag5::from(make_ticket(MakeTicketParams {
            realm,
            session_key,
            ticket_encryption_key: &service.key,
            kdc_options: kdc_options.0.clone(),
            sname,
            cname,
            etype: etype.clone(),
            auth_time,
            end_time,
        })?),
        enc_part: ExplicitContextTag6::from(EncryptedData {
            etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![u8::from(session_etype)])),
            kvno: Optional::from(None),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(tgs_rep_enc_part)),
        }),
    }))
}
