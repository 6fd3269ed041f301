// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Raw RSA-2048/4096 primitives and PKCS#1 v1.5 encryption/signing.
//!
//! The certificate-chain verifier (`crypto::cert`) needs the *raw* `sig^e mod n` block, padding
//! and all, to replicate the original's bit-for-bit fakesign detection; that rules out using
//! [rsa]'s high-level `verify()`, which rejects a malformed/fakesigned block outright. Signing
//! (real-signing debug tickets/TMDs, and the imprint stamp's public-key encryption) goes through
//! [rsa]'s standard PKCS#1 v1.5 implementations instead, since there both sides are honest.

use num_bigint_dig::{BigInt, ModInverse, Sign};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Pkcs1v15Encrypt, Pkcs1v15Sign};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

/// Errors surfaced by the raw RSA layer.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum RsaCryptoError {
    #[error("RSA key error: {0}")]
    Key(#[from] rsa::Error),

    #[error("modulus must be 256 (RSA-2048) or 512 (RSA-4096) bytes, got {0}")]
    UnsupportedModulusSize(usize),

    #[error("derived private exponent has no modular inverse; p/q/e are not a valid keypair")]
    NoModularInverse,
}

/// Compute `sig^e mod n` and return it as a big-endian buffer exactly `modulus.len()` bytes long.
///
/// This is the raw PKCS#1 block a signature decrypts to; the caller is responsible for
/// interpreting its padding (see `crypto::cert::verify`).
pub fn decrypt_signature(modulus: &[u8], exponent: u32, sig: &[u8]) -> Vec<u8> {
    let n = BigUint::from_bytes_be(modulus);
    let e = BigUint::from(exponent);
    let s = BigUint::from_bytes_be(sig);

    let result = s.modpow(&e, &n);
    let mut out = result.to_bytes_be();

    // `to_bytes_be` drops leading zero bytes; pad back out to the modulus width.
    if out.len() < modulus.len() {
        let mut padded = vec![0u8; modulus.len() - out.len()];
        padded.append(&mut out);
        out = padded;
    }

    out
}

/// PKCS#1 v1.5 type-2 (public key) encryption, used only for the imprint stamp.
pub fn encrypt_pkcs1v15(
    modulus: &[u8],
    exponent: u32,
    cleartext: &[u8],
) -> Result<Vec<u8>, RsaCryptoError> {
    let n = BigUint::from_bytes_be(modulus);
    let e = BigUint::from(exponent);
    let key = RsaPublicKey::new(n, e)?;

    let mut rng = OsRng;
    Ok(key.encrypt(&mut rng, Pkcs1v15Encrypt, cleartext)?)
}

/// Derive `d = e⁻¹ mod (p-1)(q-1)` and build the private key.
///
/// The original computes the Carmichael totient `lcm(p-1, q-1)`; Euler's totient `(p-1)(q-1)`
/// (used here) is a multiple of it and yields the same `d mod n` for RSA's purposes, so either
/// is a valid private exponent.
fn private_key_from_factors(
    p: &[u8],
    q: &[u8],
    e: u32,
) -> Result<RsaPrivateKey, RsaCryptoError> {
    let p = BigUint::from_bytes_be(p);
    let q = BigUint::from_bytes_be(q);
    let n = &p * &q;
    let e = BigUint::from(e);

    let one = BigUint::from(1u32);
    let phi = (&p - &one) * (&q - &one);

    let phi_signed = BigInt::from_biguint(Sign::Plus, phi);
    let e_signed = BigInt::from_biguint(Sign::Plus, e.clone());

    let d_signed = e_signed
        .mod_inverse(&phi_signed)
        .ok_or(RsaCryptoError::NoModularInverse)?;
    let (_, d) = d_signed.to_bytes_be();
    let d = BigUint::from_bytes_be(&d);

    RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(RsaCryptoError::Key)
}

/// RSA-2048 sign `digest` (a SHA-1 digest) with the private key derived from `(p, q, e)`.
pub fn rsa2048_sign_sha1(
    p: &[u8],
    q: &[u8],
    e: u32,
    digest: &[u8; 20],
) -> Result<[u8; 256], RsaCryptoError> {
    let key = private_key_from_factors(p, q, e)?;
    let sig = key.sign(Pkcs1v15Sign::new::<sha1::Sha1>(), digest)?;

    let mut out = [0u8; 256];
    let start = 256 - sig.len();
    out[start..].copy_from_slice(&sig);

    Ok(out)
}

/// RSA-2048 sign `digest` (a SHA-256 digest), for the Wii U format variant.
pub fn rsa2048_sign_sha256(
    p: &[u8],
    q: &[u8],
    e: u32,
    digest: &[u8; 32],
) -> Result<[u8; 256], RsaCryptoError> {
    let key = private_key_from_factors(p, q, e)?;
    let sig = key.sign(Pkcs1v15Sign::new::<sha2::Sha256>(), digest)?;

    let mut out = [0u8; 256];
    let start = 256 - sig.len();
    out[start..].copy_from_slice(&sig);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha1;

    fn test_keypair() -> (Vec<u8>, Vec<u8>, u32, RsaPublicKey) {
        // Deterministic-ish small key only usable inside this test module; real certificate
        // moduli are embedded separately in `crypto::cert`.
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let primes = key.primes();
        let p = primes[0].to_bytes_be();
        let q = primes[1].to_bytes_be();
        let pubkey = RsaPublicKey::from(&key);

        (p, q, 0x10001, pubkey)
    }

    #[test]
    fn sign_then_raw_decrypt_recovers_padded_digest() {
        let (p, q, e, pubkey) = test_keypair();
        let digest = sha1(b"hello rvth");

        let sig = rsa2048_sign_sha1(&p, &q, e, &digest).expect("sign");
        let modulus = pubkey.n().to_bytes_be();

        let block = decrypt_signature(&modulus, e, &sig);

        assert_eq!(block.len(), 256);
        assert_eq!(block[0], 0x00);
        assert_eq!(block[1], 0x01);
        assert_eq!(&block[block.len() - 20..], &digest);
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let pubkey = RsaPublicKey::from(&key);
        let modulus = pubkey.n().to_bytes_be();

        let ciphertext = encrypt_pkcs1v15(&modulus, 0x10001, b"imprint payload").expect("encrypt");
        let plain = key
            .decrypt(Pkcs1v15Encrypt, &ciphertext)
            .expect("decrypt");

        assert_eq!(plain, b"imprint payload");
    }
}
