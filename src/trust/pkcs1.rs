//! Minimal DER encoder for PKCS#1 `RSAPublicKey`.
//!
//! The trust store compares peer keys byte-wise, so the encoding has to be
//! canonical: minimal-length INTEGERs with a sign pad only when the high
//! bit is set. Leading zero bytes in the input are stripped first.

/// Encode an RSA public key as PKCS#1 `RSAPublicKey` DER: a SEQUENCE of
/// two INTEGERs, modulus then public exponent.
pub fn encode_rsa_public_key(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let n = der_integer(modulus);
    let e = der_integer(exponent);
    let mut out = Vec::with_capacity(n.len() + e.len() + 4);
    out.push(0x30);
    push_der_length(&mut out, n.len() + e.len());
    out.extend_from_slice(&n);
    out.extend_from_slice(&e);
    out
}

/// DER INTEGER from unsigned big-endian bytes.
fn der_integer(bytes: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < bytes.len() && bytes[start] == 0 {
        start += 1;
    }
    let trimmed = &bytes[start..];
    let needs_pad = trimmed.first().map_or(true, |b| b & 0x80 != 0);

    let mut out = vec![0x02];
    push_der_length(&mut out, trimmed.len() + usize::from(needs_pad));
    if needs_pad {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

fn push_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 128 {
        out.push(len as u8);
    } else {
        let be = len.to_be_bytes();
        let first = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
        out.push(0x80 | (be.len() - first) as u8);
        out.extend_from_slice(&be[first..]);
    }
}
