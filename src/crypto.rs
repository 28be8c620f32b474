// SPDX-License-Identifier: MIT OR Apache-2.0
//! AES-128 block operations used by the Green Power authenticator.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

/// AES block size in bytes; CBC-MAC input must be a multiple of this.
pub const BLOCK_SIZE: usize = 16;

/// An AES-128 key schedule.
pub struct Aes {
    cipher: Aes128,
}

impl Aes {
    #[must_use]
    pub fn new(key: &[u8; BLOCK_SIZE]) -> Self {
        Self { cipher: Aes128::new(GenericArray::from_slice(key)) }
    }

    /// Encrypts a single block in place (ECB).
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    /// Runs a CBC-MAC chain over block-aligned input starting from `iv`,
    /// returning the final cipher state: each input block is XORed into the
    /// running state, which is then encrypted.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not a multiple of [`BLOCK_SIZE`]; callers pad
    /// with `0x00`.
    #[must_use]
    pub fn cbc_mac_with_iv(&self, iv: [u8; BLOCK_SIZE], data: &[u8]) -> [u8; BLOCK_SIZE] {
        assert_eq!(data.len() % BLOCK_SIZE, 0);
        let mut state = iv;
        for block in data.chunks_exact(BLOCK_SIZE) {
            for (s, b) in state.iter_mut().zip(block) {
                *s ^= b;
            }
            self.encrypt_block(&mut state);
        }
        state
    }

    /// CBC-MAC with the all-zero initialisation vector.
    #[must_use]
    pub fn cbc_mac(&self, data: &[u8]) -> [u8; BLOCK_SIZE] {
        self.cbc_mac_with_iv([0; BLOCK_SIZE], data)
    }
}
