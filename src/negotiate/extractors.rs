use picky_asn1::tag::Tag;
use picky_asn1::wrapper::ObjectIdentifierAsn1;
use picky_asn1_x509::oids;
use picky_krb::constants::gss_api::AP_REQ_TOKEN_ID;
use picky_krb::gss_api::{GssApiNegInit, KrbMessage, MechTypeList, NegTokenInit};
use picky_krb::messages::ApReq;

use crate::{Error, ErrorKind, Result};

/// Extracts the mech types and the mech token from a DER encoded SPNEGO NegTokenInit.
#[instrument(level = "trace", skip_all)]
pub fn decode_neg_token_init(data: &[u8]) -> Result<(MechTypeList, Vec<u8>)> {
    if data.first().copied() != Some(Tag::application_constructed(0).inner()) {
        return Err(Error::new(
            ErrorKind::EncodingFailed,
            "SPNEGO token is not a GSS-API [APPLICATION 0] initial context token",
        ));
    }

    // [APPLICATION 0] IMPLICIT SEQUENCE: decoded as a plain SEQUENCE so malformed input is an error
    let mut sequence = data.to_vec();
    sequence[0] = Tag::SEQUENCE.inner();
    let token: GssApiNegInit = picky_asn1_der::from_bytes(&sequence)
        .map_err(|err| Error::new(ErrorKind::EncodingFailed, format!("malformed NegTokenInit: {:?}", err)))?;

    let spnego = ObjectIdentifierAsn1::from(oids::spnego());
    if token.oid != spnego {
        return Err(Error::new(
            ErrorKind::EncodingFailed,
            "GSS-API token does not carry the SPNEGO mechanism",
        ));
    }

    let NegTokenInit {
        mech_types,
        req_flags: _,
        mech_token,
        mech_list_mic: _,
    } = token.neg_token_init.0;

    let mech_types = mech_types
        .0
        .ok_or_else(|| Error::new(ErrorKind::EncodingFailed, "mech_types is missing in NegTokenInit"))?
        .0;
    let mech_token = mech_token
        .0
        .ok_or_else(|| Error::new(ErrorKind::EncodingFailed, "mech_token is missing in NegTokenInit"))?
        .0
         .0;

    Ok((mech_types, mech_token))
}

/// Extracts the AP-REQ from a GSS-API KRB5 initial context token.
#[instrument(level = "trace", skip_all)]
pub fn decode_krb5_ap_req(mech_token: &[u8]) -> Result<ApReq> {
    let krb_message = KrbMessage::<ApReq>::decode_application_krb_message(mech_token)?.0;

    if krb_message.krb5_oid != ObjectIdentifierAsn1::from(oids::krb5()) {
        return Err(Error::new(
            ErrorKind::EncodingFailed,
            "invalid oid inside mech_token: expected krb5",
        ));
    }

    if krb_message.krb5_token_id != AP_REQ_TOKEN_ID {
        return Err(Error::new(
            ErrorKind::EncodingFailed,
            format!(
                "invalid kerberos token id: expected {:?} but got {:?}",
                AP_REQ_TOKEN_ID, krb_message.krb5_token_id
            ),
        ));
    }

    Ok(krb_message.krb_msg)
}
