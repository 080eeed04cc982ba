//! Random words for the unlock handshakes.
//!
//! Neither handshake needs cryptographic randomness, the cartridge only
//! echoes the values back. The source still stays pluggable so tests can pin
//! it and real dumps can draw from `rand`.

use rand::RngCore;

pub trait Entropy {
    fn next_word(&mut self) -> u32;
}

/// Draws words from any `rand` generator.
pub struct RandEntropy<R>(pub R);

impl<R: RngCore> Entropy for RandEntropy<R> {
    fn next_word(&mut self) -> u32 {
        self.0.next_u32()
    }
}

/// Cycles through a fixed list of words.
#[derive(Clone, Debug)]
pub struct FixedEntropy {
    words: Vec<u32>,
    i: usize,
}

impl FixedEntropy {
    /// `None` for an empty list, there would be nothing to cycle through.
    pub fn new(words: Vec<u32>) -> Option<Self> {
        (!words.is_empty()).then_some(Self { words, i: 0 })
    }

    /// The stand-in CTR challenge words used until a hardware RNG is wired up.
    pub fn placeholder() -> Self {
        Self {
            words: vec![0x4243_4445, 0x4647_4849],
            i: 0,
        }
    }
}

impl Entropy for FixedEntropy {
    fn next_word(&mut self) -> u32 {
        let v = self.words[self.i];
        self.i = (self.i + 1) % self.words.len();
        v
    }
}
