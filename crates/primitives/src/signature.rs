use alloy_primitives::{Address, B256, Signature};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::{
    EncodedPoint,
    ecdsa::{Signature as P256Signature, VerifyingKey, signature::hazmat::PrehashVerifier},
};
use sha2::{Digest, Sha256};

use crate::key::KeyType;

/// Length of a secp256k1 signature: `r || s || v`.
pub const SECP256K1_SIGNATURE_LENGTH: usize = 65;

/// Length of a raw P256 signature: `r || s`.
pub const P256_SIGNATURE_LENGTH: usize = 64;

// authenticatorData is 32 rpIdHash + 1 flags + 4 signCount; extensions are not supported
const AUTH_DATA_LEN: usize = 37;

const FLAG_UP: u8 = 0x01;
const FLAG_AT: u8 = 0x40;
const FLAG_ED: u8 = 0x80;

/// Reasons a signature fails built-in verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("external keys are verified by their validator")]
    External,

    #[error("signature has invalid length {0}")]
    InvalidLength(usize),

    #[error("public key is not a valid {0:?} key")]
    InvalidPublicKey(KeyType),

    #[error("invalid signature encoding")]
    InvalidEncoding,

    #[error("signature does not match the public key")]
    Mismatch,

    #[error("invalid webauthn data: {0}")]
    WebAuthn(&'static str),
}

/// Verifies `signature` over `digest` against a public key of `key_type`.
///
/// - secp256k1: 65 bytes `r || s || v`, the recovered address must equal the public key
/// - P256: 64 bytes `r || s`, or 65 bytes with a trailing pre-hash flag requesting that
///   `sha256(digest)` is verified instead
/// - WebAuthn P256: `authenticatorData || clientDataJSON || r || s`
pub fn verify(
    key_type: KeyType,
    public_key: &[u8],
    digest: &B256,
    signature: &[u8],
) -> Result<(), SignatureError> {
    match key_type {
        KeyType::Secp256k1 => {
            let signer = recover_secp256k1(digest, signature)?;
            if public_key != signer.as_slice() {
                return Err(SignatureError::Mismatch);
            }
            Ok(())
        }
        KeyType::P256 => {
            let (rs, message_hash) = match signature.len() {
                P256_SIGNATURE_LENGTH => (signature, *digest),
                65 if signature[64] == 1 => {
                    (&signature[..64], B256::from_slice(&Sha256::digest(digest.as_slice())))
                }
                65 if signature[64] == 0 => (&signature[..64], *digest),
                len => return Err(SignatureError::InvalidLength(len)),
            };
            verify_p256(rs, public_key, &message_hash)
                .map_err(|err| err.with_key_type(KeyType::P256))
        }
        KeyType::WebAuthnP256 => {
            let Some(split) = signature.len().checked_sub(P256_SIGNATURE_LENGTH) else {
                return Err(SignatureError::InvalidLength(signature.len()));
            };
            let (webauthn_data, rs) = signature.split_at(split);
            let message_hash =
                webauthn_message_hash(webauthn_data, digest).map_err(SignatureError::WebAuthn)?;
            verify_p256(rs, public_key, &message_hash)
                .map_err(|err| err.with_key_type(KeyType::WebAuthnP256))
        }
        KeyType::External => Err(SignatureError::External),
    }
}

/// Recovers the signer address of a 65-byte secp256k1 signature over a prehashed digest.
pub fn recover_secp256k1(digest: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SECP256K1_SIGNATURE_LENGTH {
        return Err(SignatureError::InvalidLength(signature.len()));
    }
    let sig = Signature::try_from(signature).map_err(|_| SignatureError::InvalidEncoding)?;
    sig.recover_address_from_prehash(digest).map_err(|_| SignatureError::Mismatch)
}

impl SignatureError {
    fn with_key_type(self, key_type: KeyType) -> Self {
        match self {
            Self::InvalidPublicKey(_) => Self::InvalidPublicKey(key_type),
            other => other,
        }
    }
}

fn verify_p256(rs: &[u8], public_key: &[u8], message_hash: &B256) -> Result<(), SignatureError> {
    if public_key.len() != 64 {
        return Err(SignatureError::InvalidPublicKey(KeyType::P256));
    }
    let (x, y) = public_key.split_at(32);
    let encoded_point = EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
    let verifying_key = VerifyingKey::from_encoded_point(&encoded_point)
        .map_err(|_| SignatureError::InvalidPublicKey(KeyType::P256))?;

    let signature = P256Signature::from_slice(rs).map_err(|_| SignatureError::InvalidEncoding)?;

    verifying_key
        .verify_prehash(message_hash.as_slice(), &signature)
        .map_err(|_| SignatureError::Mismatch)
}

/// Validates WebAuthn assertion data and returns the hash the authenticator signed.
///
/// `sha256(authenticatorData || sha256(clientDataJSON))`
/// ref: <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>
fn webauthn_message_hash(webauthn_data: &[u8], digest: &B256) -> Result<B256, &'static str> {
    if webauthn_data.len() < AUTH_DATA_LEN + 32 {
        return Err("data too short");
    }

    let flags = webauthn_data[32];
    if flags & FLAG_UP == 0 {
        return Err("user presence flag not set");
    }
    if flags & FLAG_AT != 0 {
        return Err("attested credential data flag set");
    }
    if flags & FLAG_ED != 0 {
        return Err("extensions are not supported");
    }

    let (authenticator_data, client_data_json) = webauthn_data.split_at(AUTH_DATA_LEN);

    let json = core::str::from_utf8(client_data_json).map_err(|_| "clientDataJSON is not utf-8")?;
    if !json.starts_with('{') || !json.ends_with('}') {
        return Err("clientDataJSON is not an object");
    }
    if !json.contains("\"type\":\"webauthn.get\"") {
        return Err("clientDataJSON type is not webauthn.get");
    }

    let challenge = format!("\"challenge\":\"{}\"", URL_SAFE_NO_PAD.encode(digest.as_slice()));
    if !json.contains(&challenge) {
        return Err("clientDataJSON challenge does not match digest");
    }

    let mut hasher = Sha256::new();
    hasher.update(authenticator_data);
    hasher.update(Sha256::digest(client_data_json));
    Ok(B256::from_slice(&hasher.finalize()))
}
