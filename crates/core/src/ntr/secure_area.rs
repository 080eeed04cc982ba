//! Software half of the secure area decryption.
//!
//! The first block (the area's own id) is keyed with the light schedule, the
//! first 0x800 bytes again with the full one. Swapping the stages destroys
//! the data, there is no checksum to recover from.

use crate::error::{Error, Result};

use super::key1::{CipherState, Key1Table, Stage};

pub use super::unlock::SECURE_AREA_SIZE;

/// Words covered by the full stage pass, starting at word 0.
const FULL_STAGE_WORDS: usize = 0x200;

/// What the first block reads once decrypted.
pub const SECURE_AREA_ID: &[u8; 8] = b"encryObj";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecureAreaStatus {
    /// The id block decrypted to [`SECURE_AREA_ID`].
    Decrypted,
    /// Anything else: wrong key, wrong game code or an area that was never
    /// encrypted.
    Unrecognized,
}

/// Decrypt the secure area in place.
pub fn decrypt(area: &mut [u8], base: &Key1Table, game_code: u32) -> Result<SecureAreaStatus> {
    check_len(area)?;

    let light = CipherState::new(base, game_code, Stage::Light);
    map_block(area, 0, |b| light.decrypt(b));

    let full = CipherState::new(base, game_code, Stage::Full);
    for i in (0..FULL_STAGE_WORDS).step_by(2) {
        map_block(area, i, |b| full.decrypt(b));
    }

    let status = if &area[..8] == SECURE_AREA_ID {
        SecureAreaStatus::Decrypted
    } else {
        tracing::warn!(
            game_code = format_args!("{game_code:08x}"),
            "secure area id did not decrypt, data is probably garbage"
        );
        SecureAreaStatus::Unrecognized
    };
    Ok(status)
}

/// Inverse of [`decrypt`].
pub fn encrypt(area: &mut [u8], base: &Key1Table, game_code: u32) -> Result<()> {
    check_len(area)?;

    let full = CipherState::new(base, game_code, Stage::Full);
    for i in (0..FULL_STAGE_WORDS).step_by(2) {
        map_block(area, i, |b| full.encrypt(b));
    }

    let light = CipherState::new(base, game_code, Stage::Light);
    map_block(area, 0, |b| light.encrypt(b));
    Ok(())
}

fn check_len(area: &[u8]) -> Result<()> {
    let need = FULL_STAGE_WORDS * 4;
    if area.len() < need {
        return Err(Error::BufferTooSmall {
            need,
            got: area.len(),
        });
    }
    Ok(())
}

fn map_block(area: &mut [u8], word_i: usize, f: impl FnOnce([u32; 2]) -> [u32; 2]) {
    let bytes = &mut area[word_i * 4..word_i * 4 + 8];
    let lo = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let hi = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let [lo, hi] = f([lo, hi]);
    bytes[..4].copy_from_slice(&lo.to_le_bytes());
    bytes[4..].copy_from_slice(&hi.to_le_bytes());
}
