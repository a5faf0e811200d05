use std::sync::Mutex;

use kerberos_token::network_client::{NetworkClient, NetworkRequest};
use kerberos_token::{CancellationToken, Error, ErrorKind, Result};
use picky_krb::messages::{AsReq, KrbError, TgsReq};

use super::as_exchange::PA_REQ_ENC_PA_REP;
use super::config::KerberosServer;
use super::handle_kdc_message;

/// What the KDC saw across all requests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KdcObservations {
    /// One entry per AS-REQ: whether it carried PA-REQ-ENC-PA-REP.
    pub as_reqs_with_fast_negotiation: Vec<bool>,
    pub tgs_reqs: usize,
    /// KRB-ERROR codes sent back, in order.
    pub errors: Vec<u32>,
}

impl KdcObservations {
    pub fn as_reqs(&self) -> usize {
        self.as_reqs_with_fast_negotiation.len()
    }
}

/// [`NetworkClient`] that answers every request from an in-process KDC instead of the network.
#[derive(Debug)]
pub struct MockKdc {
    config: KerberosServer,
    observations: Mutex<KdcObservations>,
    /// Cancels the request after answering the AS-REQ.
    cancel_after_as_rep: bool,
}

impl MockKdc {
    pub fn new(config: KerberosServer) -> Self {
        Self {
            config,
            observations: Mutex::new(KdcObservations::default()),
            cancel_after_as_rep: false,
        }
    }

    pub fn cancelling_after_as_rep(mut self) -> Self {
        self.cancel_after_as_rep = true;
        self
    }

    pub fn config(&self) -> &KerberosServer {
        &self.config
    }

    pub fn observations(&self) -> KdcObservations {
        self.observations.lock().unwrap().clone()
    }

    fn observe(&self, request: &[u8], reply: &[u8]) {
        let mut observations = self.observations.lock().unwrap();

        if let Ok(as_req) = picky_asn1_der::from_bytes::<AsReq>(request) {
            let fast_negotiation = as_req.0.padata.0.as_ref().is_some_and(|pa_datas| {
                pa_datas
                    .0
                     .0
                    .iter()
                    .any(|pa_data| pa_data.padata_type.0 .0 == PA_REQ_ENC_PA_REP)
            });
            observations.as_reqs_with_fast_negotiation.push(fast_negotiation);
        } else if picky_asn1_der::from_bytes::<TgsReq>(request).is_ok() {
            observations.tgs_reqs += 1;
        }

        if let Ok(krb_error) = picky_asn1_der::from_bytes::<KrbError>(reply) {
            observations.errors.push(krb_error.0.error_code.0);
        }
    }
}

impl NetworkClient for MockKdc {
    fn send(&self, request: &NetworkRequest, cancellation: &CancellationToken) -> Result<Vec<u8>> {
        // first 4 bytes are message len
        let message = request
            .data
            .get(4..)
            .ok_or_else(|| Error::new(ErrorKind::InternalError, "KDC request is missing its length prefix"))?;

        let reply = handle_kdc_message(message, &self.config)
            .map_err(|err| Error::new(ErrorKind::InternalError, format!("mock KDC failed: {err:?}")))?;
        self.observe(message, &reply);

        if self.cancel_after_as_rep && picky_asn1_der::from_bytes::<AsReq>(message).is_ok() {
            cancellation.cancel();
        }

        let mut framed = (reply.len() as u32).to_be_bytes().to_vec();
        framed.extend_from_slice(&reply);

        Ok(framed)
    }
}
