use std::io::Write;

use picky_asn1::wrapper::IntegerAsn1;
use picky_krb::crypto::CipherSuite;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::Serialize;

use crate::{Error, ErrorKind, Result, Secret};

pub(crate) fn serialize_message<T: ?Sized + Serialize>(v: &T) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    // 4 bytes: length of the message
    data.write_all(&[0, 0, 0, 0])?;

    picky_asn1_der::to_writer(v, &mut data)?;

    let len = data.len() as u32 - 4;
    data[0..4].copy_from_slice(&len.to_be_bytes());

    Ok(data)
}

/// Prefixes already encoded message bytes with their 4-byte big-endian length.
pub(crate) fn frame_message(encoded: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(encoded.len() + 4);
    data.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
    data.extend_from_slice(encoded);

    data
}

/// Returns the message body of a length-prefixed KDC reply.
pub(crate) fn unframe_reply(response: &[u8]) -> Result<&[u8]> {
    // first 4 bytes are message len. skipping them
    response.get(4..).filter(|body| !body.is_empty()).ok_or_else(|| {
        Error::new(
            ErrorKind::InternalError,
            "the KDC reply message is too small: expected at least 4 bytes",
        )
    })
}

/// Reads a DER INTEGER as an unsigned 32-bit value.
pub(crate) fn integer_to_u32(integer: &IntegerAsn1) -> Option<u32> {
    let bytes = integer.0.as_slice();
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return Some(0),
    };

    if significant.len() > 4 {
        return None;
    }

    Some(significant.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Kerberos nonces are `UInt32`, kept below 2^31 so the DER integer is never negative.
pub(crate) fn generate_nonce() -> u32 {
    OsRng.gen::<u32>() & 0x7fff_ffff
}

/// Minimal DER INTEGER for an unsigned value: nonces and sequence numbers.
pub(crate) fn u32_to_integer(value: u32) -> IntegerAsn1 {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);

    IntegerAsn1::from_bytes_be_unsigned(bytes[start..].to_vec())
}

/// Generates a random key of the cipher's size. DES3 is not supported.
pub(crate) fn generate_random_symmetric_key(cipher_suite: &CipherSuite) -> Result<Secret<Vec<u8>>> {
    match cipher_suite {
        CipherSuite::Aes256CtsHmacSha196 | CipherSuite::Aes128CtsHmacSha196 => {
            let mut key = vec![0; cipher_suite.cipher().key_size()];
            OsRng.fill_bytes(&mut key);

            Ok(Secret::new(key))
        }
        CipherSuite::Des3CbcSha1Kd => Err(Error::new(
            ErrorKind::InternalError,
            "random key generation is not supported for DES3",
        )),
    }
}

/// Splits a service name into the components of an NT-SRV-INST principal.
///
/// Accepts `service/host` and the GSS host-based form `service@host`.
pub fn parse_service_principal(service: &str) -> Result<Vec<String>> {
    let service = service.trim();

    let (service_name, host) = service
        .split_once('/')
        .or_else(|| service.split_once('@'))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfiguration,
                format!("service `{service}` must be `service/host` or `service@host`"),
            )
        })?;

    // service/host@REALM: the realm part is dropped, the request realm is used
    let host = host.split_once('@').map(|(host, _)| host).unwrap_or(host);

    if service_name.is_empty() || host.is_empty() || host.contains('/') {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("service `{service}` must be `service/host` or `service@host`"),
        ));
    }

    if !service.is_ascii() || service.chars().any(|c| c.is_ascii_whitespace() || c.is_ascii_control()) {
        return Err(Error::new(
            ErrorKind::InvalidConfiguration,
            format!("service `{service}` contains invalid characters"),
        ));
    }

    Ok(vec![service_name.to_owned(), host.to_owned()])
}
