//! Just enough of the NCSD and NCCH layouts to size a dump.

use crate::error::{Error, Result};

pub const NCSD_SIZE: usize = 0x200;

const MAGIC_OFFSET: usize = 0x100;
const PARTITION_TABLE: usize = 0x120;
const PARTITION_FLAGS: usize = 0x188;
const MEDIA_UNIT_FLAG: usize = 6;
const PRODUCT_CODE: usize = 0x150;

pub const NCSD_MAGIC: &[u8; 4] = b"NCSD";
pub const NCCH_MAGIC: &[u8; 4] = b"NCCH";

/// Whether `bin` carries `magic` at the usual place of both container
/// headers.
pub fn has_magic(bin: &[u8], magic: &[u8; 4]) -> bool {
    bin.get(MAGIC_OFFSET..MAGIC_OFFSET + 4) == Some(&magic[..])
}

/// The product code of an NCCH header, e.g. `"CTR-P-ABCE"`.
pub fn product_code(ncch: &[u8]) -> String {
    ncch.get(PRODUCT_CODE..PRODUCT_CODE + 0x10)
        .unwrap_or_default()
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as char)
        .collect()
}

/// Where a dumped image keeps the initial header.
pub const INITIAL_HEADER_OFFSET: usize = 0x1000;
/// Size of the area reserved for it; only the first 0x200 bytes are header.
const INITIAL_HEADER_AREA: usize = 0x3000;

/// Write the initial header into a dump that starts at sector 0.
///
/// The cartridge returns garbage for that area in data mode, so everything
/// after the header up to 0x4000 is filled with 0xFF.
pub fn splice_initial_header(image: &mut [u8], header: &[u8]) -> Result<()> {
    let area_end = INITIAL_HEADER_OFFSET + INITIAL_HEADER_AREA;
    if image.len() < area_end {
        return Err(Error::BufferTooSmall {
            need: area_end,
            got: image.len(),
        });
    }
    let header = header.get(..NCSD_SIZE).ok_or(Error::HeaderTooShort {
        need: NCSD_SIZE,
        got: header.len(),
    })?;

    let area = &mut image[INITIAL_HEADER_OFFSET..area_end];
    area[..NCSD_SIZE].copy_from_slice(header);
    area[NCSD_SIZE..].fill(0xFF);
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    /// In media units.
    pub offset: u32,
    /// In media units.
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NcsdHeader {
    pub partitions: [Partition; 8],
    pub flags: [u8; 8],
}

impl NcsdHeader {
    pub fn parse(bin: &[u8]) -> Result<Self> {
        if bin.len() < NCSD_SIZE {
            return Err(Error::HeaderTooShort {
                need: NCSD_SIZE,
                got: bin.len(),
            });
        }
        if !has_magic(bin, NCSD_MAGIC) {
            tracing::warn!("NCSD magic not found, continuing anyway");
        }

        let u32_at = |i: usize| u32::from_le_bytes([bin[i], bin[i + 1], bin[i + 2], bin[i + 3]]);

        let mut partitions = [Partition { offset: 0, size: 0 }; 8];
        for (i, p) in partitions.iter_mut().enumerate() {
            let at = PARTITION_TABLE + i * 8;
            *p = Partition {
                offset: u32_at(at),
                size: u32_at(at + 4),
            };
        }

        let mut flags = [0u8; 8];
        flags.copy_from_slice(&bin[PARTITION_FLAGS..PARTITION_FLAGS + 8]);

        Ok(Self { partitions, flags })
    }

    /// Bytes per media unit.
    pub fn media_unit(&self) -> u32 {
        0x200u32 << self.flags[MEDIA_UNIT_FLAG].min(22)
    }

    /// Used part of the cartridge in media units: the first partition's
    /// offset plus every partition's size.
    pub fn used_units(&self) -> u32 {
        self.partitions
            .iter()
            .fold(self.partitions[0].offset, |acc, p| acc.wrapping_add(p.size))
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_units() as u64 * self.media_unit() as u64
    }
}
