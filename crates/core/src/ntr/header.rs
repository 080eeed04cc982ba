use crate::error::{Error, Result};

use super::key1::Generation;

pub const HEADER_SIZE: usize = 0x200;

/// Checksum every licensed header carries for the boot logo.
const LOGO_CRC: u16 = 0xCF56;

/// Unit code bit set by DSi enhanced and DSi exclusive titles.
const UNIT_CODE_TWL: u8 = 0x02;

/// The parts of the NTR/TWL cartridge header the unlock needs, plus a few
/// fields for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NtrHeader {
    pub title: String,
    /// Game code as the little endian word the key schedule consumes.
    pub game_code: u32,
    pub maker_code: [u8; 2],
    pub unit_code: u8,
    /// Index into the KEY2 seed byte table.
    pub seed_select: u8,
    pub device_capacity: u8,
    pub rom_version: u8,
    pub arm9_rom_offset: u32,
    /// ROMCNT setting for normal (data mode) commands.
    pub normal_romcnt: u32,
    /// ROMCNT setting for KEY1 commands.
    pub key1_romcnt: u32,
    /// Delay the cartridge needs after some KEY1 commands, in 131 kHz ticks.
    pub secure_area_delay: u16,
    pub total_used_rom_size: u32,
    pub logo_crc: u16,
}

impl NtrHeader {
    pub fn parse(bin: &[u8]) -> Result<Self> {
        if bin.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort {
                need: HEADER_SIZE,
                got: bin.len(),
            });
        }

        let u16_at = |i: usize| u16::from_le_bytes([bin[i], bin[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bin[i], bin[i + 1], bin[i + 2], bin[i + 3]]);

        let title = bin[0..12]
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as char)
            .collect();

        Ok(Self {
            title,
            game_code: u32_at(0x0C),
            maker_code: [bin[0x10], bin[0x11]],
            unit_code: bin[0x12],
            seed_select: bin[0x13],
            device_capacity: bin[0x14],
            rom_version: bin[0x1E],
            arm9_rom_offset: u32_at(0x20),
            normal_romcnt: u32_at(0x60),
            key1_romcnt: u32_at(0x64),
            secure_area_delay: u16_at(0x6E),
            total_used_rom_size: u32_at(0x80),
            logo_crc: u16_at(0x15C),
        })
    }

    /// The four game code characters, e.g. `"ABCE"`.
    pub fn game_code_str(&self) -> String {
        self.game_code
            .to_le_bytes()
            .iter()
            .map(|&c| if c.is_ascii_graphic() { c as char } else { '.' })
            .collect()
    }

    /// Secure area delay converted from 131 kHz ticks to microseconds.
    pub fn secure_area_delay_us(&self) -> u32 {
        (self.secure_area_delay as f64 * 7.63) as u32
    }

    /// ROM chip size from the capacity field.
    pub fn rom_size_bytes(&self) -> u64 {
        (128 * 1024u64) << self.device_capacity.min(40)
    }

    /// Base table generation the cartridge expects.
    pub fn generation(&self) -> Generation {
        if self.unit_code & UNIT_CODE_TWL != 0 {
            Generation::Twl
        } else {
            Generation::Ntr
        }
    }

    /// Whether the logo checksum has the value every licensed header uses.
    pub fn logo_ok(&self) -> bool {
        self.logo_crc == LOGO_CRC
    }
}
