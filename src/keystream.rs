//! ChaCha8 keystream for the first table
//!
//! The first table is derived from a ChaCha8 keystream keyed by a single
//! domain-separation byte followed by the first 31 bytes of the plot id. The
//! nonce is all zeros. The stream is addressed in 64-byte blocks, so any
//! worker can generate its own segment without touching anyone else's state.
//!
//! Each 4-byte group of the stream is read as a big-endian `u32` (the "raw
//! word") before it is classified or transformed.
//!
//! # Example
//!
//! ```
//! use f1plot::keystream::{KeystreamGenerator, PlotId, WORDS_PER_BLOCK, TABLE1_DOMAIN};
//!
//! let plot_id = PlotId::from_bytes([7u8; 32]);
//! let mut gen = KeystreamGenerator::new(TABLE1_DOMAIN, &plot_id);
//!
//! let mut words = vec![0u32; 2 * WORDS_PER_BLOCK];
//! gen.generate(0, &mut words);
//!
//! assert_eq!(f1plot::keystream::raw_word(words[17]), gen.word_at(17));
//! ```

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha8, Key, Nonce};
use std::fmt;

/// Plot id length in bytes
pub const PLOT_ID_LEN: usize = 32;

/// Keystream block size in bytes
pub const KEYSTREAM_BLOCK_SIZE: usize = 64;

/// Number of 32-bit words per keystream block
pub const WORDS_PER_BLOCK: usize = KEYSTREAM_BLOCK_SIZE / std::mem::size_of::<u32>();

/// Domain-separation byte for the first table
pub const TABLE1_DOMAIN: u8 = 1;

/// Run-wide secret identifier of a plot
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlotId([u8; PLOT_ID_LEN]);

impl PlotId {
    pub fn from_bytes(bytes: [u8; PLOT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string (an optional `0x` prefix is accepted)
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);

        if !s.is_ascii() || s.len() != PLOT_ID_LEN * 2 {
            anyhow::bail!(
                "plot id must be {} hex characters, got {}",
                PLOT_ID_LEN * 2,
                s.len()
            );
        }

        let mut bytes = [0u8; PLOT_ID_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow::anyhow!("invalid hex digits '{}' in plot id", pair))?;
        }

        Ok(Self(bytes))
    }

    /// Generate a fresh random plot id
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; PLOT_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PLOT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlotId({})", self.to_hex())
    }
}

/// Build the 256-bit cipher key: domain byte, then the plot id minus its last byte
pub fn table_key(domain: u8, plot_id: &PlotId) -> [u8; PLOT_ID_LEN] {
    let mut key = [0u8; PLOT_ID_LEN];
    key[0] = domain;
    key[1..].copy_from_slice(&plot_id.as_bytes()[..PLOT_ID_LEN - 1]);
    key
}

/// Interpret a keystream word (in memory order) as a big-endian integer
#[inline(always)]
pub fn raw_word(word: u32) -> u32 {
    u32::from_be(word)
}

/// Block-addressable ChaCha8 keystream
///
/// Each worker owns its own generator; seeking is cheap, so workers jump
/// directly to their assigned block ranges.
pub struct KeystreamGenerator {
    cipher: ChaCha8,
}

impl KeystreamGenerator {
    pub fn new(domain: u8, plot_id: &PlotId) -> Self {
        let key = Key::from(table_key(domain, plot_id));
        let nonce = Nonce::default();

        Self {
            cipher: ChaCha8::new(&key, &nonce),
        }
    }

    /// Fill `out` with the keystream starting at block `start_block`
    ///
    /// `out.len()` must be a multiple of [`WORDS_PER_BLOCK`]. Words are left in
    /// memory order; use [`raw_word`] to read them.
    pub fn generate(&mut self, start_block: u64, out: &mut [u32]) {
        debug_assert_eq!(out.len() % WORDS_PER_BLOCK, 0);

        out.fill(0);
        self.cipher.seek(start_block * KEYSTREAM_BLOCK_SIZE as u64);
        self.cipher.apply_keystream(bytemuck::cast_slice_mut(out));
    }

    /// Raw (big-endian) word at generation index `x`
    pub fn word_at(&mut self, x: u64) -> u32 {
        let mut bytes = [0u8; 4];
        self.cipher.seek(x * 4);
        self.cipher.apply_keystream(&mut bytes);
        u32::from_be_bytes(bytes)
    }
}
