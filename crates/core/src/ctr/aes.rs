//! One CCM decrypt on the hardware AES engine, used to authenticate the
//! cartridge header block and recover the session key.

use crate::{
    bus::{spin_until, SlotBus},
    error::Result,
    regs::{self, AesCnt},
};

/// Words of the header block the session consumes: key Y (0..4), ciphertext
/// (4..8), MAC (8..12) and nonce (12..15).
pub const SESSION_WORDS: usize = 15;

const KEYSLOT_DEV: u8 = 0x11;
const KEYSLOT_RETAIL: u8 = 0x3B;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// Development cartridges use an all zero key.
    Development,
    /// Retail cartridges feed key Y from the header into the key scrambler.
    Retail,
}

impl KeySource {
    /// Decide from the CTR probe response.
    pub fn from_probe(probe: u32) -> Self {
        if probe & 3 == 3 {
            KeySource::Development
        } else {
            KeySource::Retail
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AesSessionResult {
    pub key: [u32; 4],
    pub mac_valid: bool,
}

pub fn run_session<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    block: &[u32; SESSION_WORDS],
    source: KeySource,
) -> Result<AesSessionResult> {
    bus.write32(
        regs::AES_CNT,
        (AesCnt::FLUSH_WRITE | AesCnt::FLUSH_READ).bits() | 1 << AesCnt::MAC_SIZE_SHIFT,
    );

    let route = bus.read8(regs::CARD_AES_ROUTE);
    bus.write8(regs::CARD_AES_ROUTE, route | 0x0C);

    modify_cnt(bus, |v| v | (AesCnt::IN_NORMAL | AesCnt::IN_BIG).bits());

    match source {
        KeySource::Development => {
            set_key_control(bus, KEYSLOT_DEV);
            for _ in 0..4 {
                bus.write32(regs::AES_KEYFIFO, 0);
            }
            bus.write8(regs::AES_KEYSEL, KEYSLOT_DEV);
        }
        KeySource::Retail => {
            set_key_control(bus, KEYSLOT_RETAIL);
            for &w in &block[0..4] {
                bus.write32(regs::AES_KEYYFIFO, w);
            }
            bus.write8(regs::AES_KEYSEL, KEYSLOT_RETAIL);
        }
    }

    bus.write32(regs::AES_CNT, AesCnt::UPDATE_KEY.bits());
    modify_cnt(bus, |v| v & !AesCnt::MAC_FROM_REG.bits());
    modify_cnt(bus, |v| {
        v | (AesCnt::IN_NORMAL | AesCnt::IN_BIG | AesCnt::MAC_VERIFY).bits() | 7 << AesCnt::MAC_SIZE_SHIFT
    });

    for (i, &w) in block[8..12].iter().rev().enumerate() {
        bus.write32(regs::AES_MAC + 4 * i as u32, w);
    }
    modify_cnt(bus, |v| v | (AesCnt::IN_NORMAL | AesCnt::IN_BIG).bits());
    for (i, &w) in block[12..15].iter().rev().enumerate() {
        bus.write32(regs::AES_CTR + 4 * i as u32, w);
    }
    bus.write32(regs::AES_BLKCNT, 0x10000);

    // Start in mode 0 (CCM decrypt), no IRQ, big endian normal order both
    // ways, write DMA size 3, read DMA size 0.
    modify_cnt(bus, |v| {
        let v = (v | AesCnt::START.bits()) & !(AesCnt::MODE_MASK | AesCnt::IRQ.bits());
        let v = (v | 3 << 12) & !(3 << 14);
        v | (AesCnt::IN_BIG | AesCnt::IN_NORMAL | AesCnt::OUT_BIG | AesCnt::OUT_NORMAL).bits()
    });

    for &w in &block[4..8] {
        bus.write32(regs::AES_WRFIFO, w);
    }

    spin_until(bus, limit, "AES_CNT", |b| {
        AesCnt::read_count(b.read32(regs::AES_CNT)) > 3
    })?;

    let mut key = [0u32; 4];
    for w in key.iter_mut() {
        *w = bus.read32(regs::AES_RDFIFO);
    }

    let mac_valid = bus.read32(regs::AES_CNT) & AesCnt::MAC_VALID.bits() != 0;
    if mac_valid {
        tracing::debug!(?source, "header MAC valid");
    } else {
        tracing::warn!(?source, "header MAC invalid, continuing");
    }

    Ok(AesSessionResult { key, mac_valid })
}

fn set_key_control<B: SlotBus + ?Sized>(bus: &mut B, slot: u8) {
    let v = bus.read8(regs::AES_KEYCNT);
    bus.write8(regs::AES_KEYCNT, (v & 0xC0) | slot | 0x80);
}

fn modify_cnt<B: SlotBus + ?Sized>(bus: &mut B, f: impl FnOnce(u32) -> u32) {
    let v = bus.read32(regs::AES_CNT);
    bus.write32(regs::AES_CNT, f(v));
}
