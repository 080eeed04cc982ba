//! KEY1, the Blowfish variant NTR cartridges use for unlock commands and for
//! the secure area.
//!
//! The table is laid out like a Blowfish key: 18 round keys followed by four
//! 256 entry S-boxes. Cartridge firmware ships two base tables (NTR and TWL);
//! they are not part of this crate and have to be loaded by the caller.

use crate::error::{Error, Result};

pub const KEY1_WORDS: usize = 0x412;
pub const KEY1_BYTES: usize = KEY1_WORDS * 4;

/// Number of round keys in front of the S-boxes.
const ROUND_KEYS: usize = 0x12;
const SBOX: [usize; 4] = [0x012, 0x112, 0x212, 0x312];

/// Key code words folded into the round keys. Cartridges use an 8 byte
/// modulo, i.e. words 0 and 1 alternate.
const KEY_CODE_MODULO: usize = 2;

/// Cartridge hardware generation, picks the base table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    Ntr,
    Twl,
}

/// How far the key schedule is run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Two schedule passes. Used for command frames and the first secure
    /// area block.
    Light,
    /// Three schedule passes. Used for the rest of the secure area.
    Full,
}

/// One unmodified base table.
#[derive(Clone)]
pub struct Key1Table(Box<[u32; KEY1_WORDS]>);

impl Key1Table {
    /// Parse a little endian table dump.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY1_BYTES {
            return Err(Error::KeyTableSize(bytes.len()));
        }

        let mut words = Box::new([0u32; KEY1_WORDS]);
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self(words))
    }

    pub fn from_words(words: Box<[u32; KEY1_WORDS]>) -> Self {
        Self(words)
    }

    pub fn words(&self) -> &[u32; KEY1_WORDS] {
        &self.0
    }
}

impl std::fmt::Debug for Key1Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key1Table")
            .field("p0", &format_args!("{:#010x}", self.0[0]))
            .finish_non_exhaustive()
    }
}

/// Both base tables.
#[derive(Clone, Debug)]
pub struct Key1Tables {
    pub ntr: Key1Table,
    pub twl: Key1Table,
}

impl Key1Tables {
    pub fn select(&self, generation: Generation) -> &Key1Table {
        match generation {
            Generation::Ntr => &self.ntr,
            Generation::Twl => &self.twl,
        }
    }
}

/// A keyed KEY1 table ("card hash") and the key code it was derived with.
///
/// Always built from scratch for one game code; nothing carries over from a
/// previous cartridge.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherState {
    table: Box<[u32; KEY1_WORDS]>,
    key_code: [u32; 3],
}

impl CipherState {
    pub fn new(base: &Key1Table, game_code: u32, stage: Stage) -> Self {
        let mut state = Self {
            table: base.0.clone(),
            key_code: [game_code, game_code / 2, game_code.wrapping_mul(2)],
        };

        state.apply_key_code();
        state.apply_key_code();

        state.key_code[1] = state.key_code[1].wrapping_mul(2);
        state.key_code[2] /= 2;

        if stage == Stage::Full {
            state.apply_key_code();
        }

        state
    }

    /// Throw away the current keying and derive a fresh one.
    pub fn rekey(&mut self, base: &Key1Table, game_code: u32, stage: Stage) {
        *self = Self::new(base, game_code, stage);
    }

    pub fn table(&self) -> &[u32; KEY1_WORDS] {
        &self.table
    }

    pub fn key_code(&self) -> [u32; 3] {
        self.key_code
    }

    /// Forward pass.
    pub fn encrypt(&self, block: [u32; 2]) -> [u32; 2] {
        let t = &self.table;
        let [mut y, mut x] = block;
        for i in 0..0x10 {
            let z = t[i] ^ x;
            x = y ^ self.f(z);
            y = z;
        }
        [x ^ t[0x10], y ^ t[0x11]]
    }

    /// Reverse pass, undoes [`CipherState::encrypt`] with the same table.
    pub fn decrypt(&self, block: [u32; 2]) -> [u32; 2] {
        let t = &self.table;
        let [mut y, mut x] = block;
        for i in (0x02..=0x11).rev() {
            let z = t[i] ^ x;
            x = y ^ self.f(z);
            y = z;
        }
        [x ^ t[0x01], y ^ t[0x00]]
    }

    /// Encrypt a block stored as one little endian 64 bit value (word 0 in
    /// the low half), which is how command frames are held.
    pub fn encrypt_u64(&self, v: u64) -> u64 {
        join(self.encrypt(split(v)))
    }

    pub fn decrypt_u64(&self, v: u64) -> u64 {
        join(self.decrypt(split(v)))
    }

    #[inline]
    fn f(&self, z: u32) -> u32 {
        let t = &self.table;
        let mut x = t[SBOX[0] + (z >> 24) as usize];
        x = t[SBOX[1] + ((z >> 16) & 0xFF) as usize].wrapping_add(x);
        x ^= t[SBOX[2] + ((z >> 8) & 0xFF) as usize];
        t[SBOX[3] + (z & 0xFF) as usize].wrapping_add(x)
    }

    fn apply_key_code(&mut self) {
        let [a, b] = self.encrypt([self.key_code[1], self.key_code[2]]);
        self.key_code[1] = a;
        self.key_code[2] = b;
        let [a, b] = self.encrypt([self.key_code[0], self.key_code[1]]);
        self.key_code[0] = a;
        self.key_code[1] = b;

        for i in 0..ROUND_KEYS {
            self.table[i] ^= self.key_code[i % KEY_CODE_MODULO].swap_bytes();
        }

        let mut scratch = [0u32; 2];
        for i in (0..KEY1_WORDS).step_by(2) {
            scratch = self.encrypt(scratch);
            self.table[i] = scratch[1];
            self.table[i + 1] = scratch[0];
        }
    }
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherState")
            .field("key_code", &format_args!("{:08x?}", self.key_code))
            .finish_non_exhaustive()
    }
}

fn split(v: u64) -> [u32; 2] {
    [v as u32, (v >> 32) as u32]
}

fn join(w: [u32; 2]) -> u64 {
    (w[1] as u64) << 32 | w[0] as u64
}
