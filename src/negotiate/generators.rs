use picky_asn1::wrapper::{ExplicitContextTag0, ExplicitContextTag2, ObjectIdentifierAsn1, OctetStringAsn1, Optional};
use picky_asn1_x509::oids;
use picky_krb::constants::gss_api::AP_REQ_TOKEN_ID;
use picky_krb::gss_api::{ApplicationTag0, GssApiNegInit, KrbMessage, NegTokenInit};
use picky_krb::messages::ApReq;

use crate::kerberos::client::generators::get_mech_list;
use crate::Result;

/// Wraps the AP-REQ into the GSS-API KRB5 initial context token ([RFC 4121 4.1](https://www.rfc-editor.org/rfc/rfc4121#section-4.1)).
pub(super) fn generate_krb5_ap_req_token(ap_req: ApReq) -> Result<Vec<u8>> {
    let krb_blob = ApplicationTag0(KrbMessage {
        krb5_oid: ObjectIdentifierAsn1::from(oids::krb5()),
        krb5_token_id: AP_REQ_TOKEN_ID,
        krb_msg: ap_req,
    });

    Ok(picky_asn1_der::to_vec(&krb_blob)?)
}

/// Generates the initial SPNEGO token carrying `mech_token` for the first offered mechanism.
pub(super) fn generate_neg_token_init(mech_token: Vec<u8>) -> ApplicationTag0<GssApiNegInit> {
    ApplicationTag0(GssApiNegInit {
        oid: ObjectIdentifierAsn1::from(oids::spnego()),
        neg_token_init: ExplicitContextTag0::from(NegTokenInit {
            mech_types: Optional::from(Some(ExplicitContextTag0::from(get_mech_list()))),
            req_flags: Optional::from(None),
            mech_token: Optional::from(Some(ExplicitContextTag2::from(OctetStringAsn1::from(mech_token)))),
            mech_list_mic: Optional::from(None),
        }),
    })
}
