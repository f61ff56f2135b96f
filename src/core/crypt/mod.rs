/*
 * Copyright 2026 The sfse authors
 *
 * This file is part of sfse.
 *
 * sfse is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfse is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfse. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-block confidentiality layer: AES-256-ECB followed by a seeded byte
//! shuffle and a seeded XOR stream, keyed off a password, a PIN, and the
//! block's own index.
//!
//! This does not provide integrity: a corrupted or reordered ciphertext block
//! decrypts to garbage silently, it does not fail to decrypt. See the crate's
//! top-level documentation for the rationale.

mod prng;

use crate::error::{EngineError, Result};
use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use sha3::Shake256;
use sha3::digest::{ExtendableOutput, Update, XofReader};

/// Argon2id time cost (number of passes).
const ARGON2_TIME_COST: u32 = 2;
/// Argon2id memory cost in KiB (1 MiB).
const ARGON2_MEM_COST_KIB: u32 = 1024;
/// Argon2id parallelism (lanes).
const ARGON2_PARALLELISM: u32 = 2;
/// Length in bytes of the Argon2id output.
const ARGON2_OUTPUT_LEN: usize = 32;
/// Length in bytes the PIN is reduced to before use as a KDF salt and as part of
/// the per-block seed.
const PIN_DIGEST_LEN: usize = 16;

/// Derives the 32-byte AES key for a (password, PIN) pair.
///
/// The PIN digest doubles as the Argon2id salt. The hash is taken to its
/// PHC string form (the same representation `Argon2::hash_password` hands
/// back for ordinary password storage) before being reduced with SHA-256,
/// rather than hashing the raw KDF output directly.
fn derive_key(password: &str, pin_digest: &[u8; PIN_DIGEST_LEN]) -> [u8; 32] {
    let params = Params::new(
        ARGON2_MEM_COST_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(ARGON2_OUTPUT_LEN),
    )
    .expect("static Argon2id parameters are valid");
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::encode_b64(pin_digest).expect("16-byte PIN digest is a valid salt");
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .expect("in-range Argon2id parameters never fail to hash");
    Sha256::digest(hash.to_string().as_bytes()).into()
}

/// Reduces the PIN to a 16-byte digest via SHAKE256, used both as the Argon2id
/// salt and as part of every per-block seed.
fn digest_pin(pin: &str) -> [u8; PIN_DIGEST_LEN] {
    let mut hasher = Shake256::default();
    hasher.update(pin.as_bytes());
    let mut out = [0u8; PIN_DIGEST_LEN];
    hasher.finalize_xof().read(&mut out);
    out
}

/// Pads `data` to a multiple of 16 bytes using PKCS#7.
fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - (data.len() % 16);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

/// A stateless, deterministic per-block confidentiality transform keyed by a
/// password and a PIN.
pub struct SectorCrypt {
    key: [u8; 32],
    pin_digest: [u8; PIN_DIGEST_LEN],
    cipher: Aes256,
}

impl SectorCrypt {
    /// Derives the crypt state from a password and a PIN. This is the only
    /// expensive operation (it runs Argon2id once); every subsequent
    /// [`encrypt_block`](Self::encrypt_block)/[`decrypt_block`](Self::decrypt_block)
    /// call is cheap.
    pub fn new(password: &str, pin: &str) -> Self {
        let pin_digest = digest_pin(pin);
        let key = derive_key(password, &pin_digest);
        let cipher = Aes256::new(GenericArray::from_slice(&key));
        Self {
            key,
            pin_digest,
            cipher,
        }
    }

    /// Builds the per-block seed: `key || be32(block index) || pin digest`.
    fn seed(&self, index: u32) -> Vec<u8> {
        let mut seed = Vec::with_capacity(32 + 4 + PIN_DIGEST_LEN);
        seed.extend_from_slice(&self.key);
        seed.extend_from_slice(&index.to_be_bytes());
        seed.extend_from_slice(&self.pin_digest);
        seed
    }

    fn aes_encrypt_ecb(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        for chunk in out.chunks_exact_mut(16) {
            let block = GenericArray::from_mut_slice(chunk);
            self.cipher.encrypt_block(block);
        }
        out
    }

    fn aes_decrypt_ecb(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        for chunk in out.chunks_exact_mut(16) {
            let block = GenericArray::from_mut_slice(chunk);
            self.cipher.decrypt_block(block);
        }
        out
    }

    /// Encrypts the block at logical index `index`.
    ///
    /// `plaintext` is padded with PKCS#7 to a multiple of 16 bytes if it isn't
    /// one already; for the engine's own traffic (always exactly `B` bytes,
    /// itself a multiple of 16) this branch never triggers.
    pub fn encrypt_block(&self, index: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
        let padded = if plaintext.len() % 16 != 0 {
            pkcs7_pad(plaintext)
        } else {
            plaintext.to_vec()
        };
        let ciphertext = self.aes_encrypt_ecb(&padded);
        let seed = self.seed(index);
        let mut shuffled = ciphertext;
        prng::shuffle(&seed, &mut shuffled);
        let noise = prng::stream(&seed, shuffled.len());
        let result: Vec<u8> = shuffled.iter().zip(&noise).map(|(a, b)| a ^ b).collect();
        if result.len() != padded.len() {
            return Err(EngineError::CryptLengthChange);
        }
        Ok(result)
    }

    /// Decrypts the block at logical index `index`.
    ///
    /// Mirrors [`encrypt_block`](Self::encrypt_block) in reverse. Padding is
    /// only stripped if the AES output is not itself a multiple of 16 bytes,
    /// which by construction can never happen (AES always emits whole blocks);
    /// this dead branch is kept to document the inert behavior the reference
    /// prototype had rather than to silently change it.
    pub fn decrypt_block(&self, index: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let seed = self.seed(index);
        let noise = prng::stream(&seed, ciphertext.len());
        let mut unnoised: Vec<u8> = ciphertext.iter().zip(&noise).map(|(a, b)| a ^ b).collect();
        prng::unshuffle(&seed, &mut unnoised);
        let mut decrypted = self.aes_decrypt_ecb(&unnoised);
        if decrypted.len() % 16 != 0 {
            let pad_len = *decrypted.last().unwrap_or(&0) as usize;
            if pad_len > 0 && pad_len <= decrypted.len() {
                decrypted.truncate(decrypted.len() - pad_len);
            }
        }
        Ok(decrypted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_block_sized_plaintext() {
        let crypt = SectorCrypt::new("hunter2", "1234");
        let plaintext = vec![0x42u8; 4096];
        let ciphertext = crypt.encrypt_block(7, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        let back = crypt.decrypt_block(7, &ciphertext).unwrap();
        assert_eq!(back, plaintext);
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let crypt = SectorCrypt::new("hunter2", "1234");
        let plaintext = vec![0x11u8; 64];
        let a = crypt.encrypt_block(3, &plaintext).unwrap();
        let b = crypt.encrypt_block(3, &plaintext).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_index_changes_ciphertext() {
        let crypt = SectorCrypt::new("hunter2", "1234");
        let plaintext = vec![0x11u8; 64];
        let a = crypt.encrypt_block(3, &plaintext).unwrap();
        let b = crypt.encrypt_block(4, &plaintext).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_password_or_pin_changes_ciphertext() {
        let plaintext = vec![0x99u8; 64];
        let a = SectorCrypt::new("pw1", "1234").encrypt_block(0, &plaintext).unwrap();
        let b = SectorCrypt::new("pw2", "1234").encrypt_block(0, &plaintext).unwrap();
        let c = SectorCrypt::new("pw1", "4321").encrypt_block(0, &plaintext).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn wrong_key_does_not_recover_plaintext() {
        let plaintext = vec![0x77u8; 64];
        let ciphertext = SectorCrypt::new("pw1", "1234").encrypt_block(0, &plaintext).unwrap();
        let wrong = SectorCrypt::new("pw1", "9999").decrypt_block(0, &ciphertext).unwrap();
        assert_ne!(wrong, plaintext);
    }
}
