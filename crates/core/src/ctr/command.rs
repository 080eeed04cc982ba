use crate::{bus::SlotBus, error::Result, fifo::Dest};

use super::transport::{send_command, Transfer};

pub mod opcode {
    pub const READ_HEADER: u32 = 0x82;
    pub const SEED: u32 = 0x83;
    pub const SECURE_ID: u32 = 0xA2;
    pub const SECURE_CAPS: u32 = 0xA3;
    pub const READ_DATA: u32 = 0xBF;
    pub const CONFIRM: u32 = 0xC5;
}

/// CNT timing bits per command.
mod latency {
    pub const READ_HEADER: u32 = 0x0004_802C;
    pub const SEED: u32 = 0x0700_822C;
    pub const CHALLENGE: u32 = 0x0701_002C;
    pub const CONFIRM: u32 = 0x0100_002C;
    pub const READ_DATA: u32 = 0x0704_822C;
}

pub const HEADER_SIZE: usize = 0x200;

fn command(op: u32, w1: u32, w2: u32, w3: u32) -> [u32; 4] {
    [op << 24, w1, w2, w3]
}

/// Read the plaintext initial header block.
pub fn read_header<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>, dest: Dest<'_>) -> Result<usize> {
    let cmd = command(opcode::READ_HEADER, 0, 0, 0);
    send_command(bus, limit, &cmd, Transfer::new(HEADER_SIZE as u32, 1, dest), latency::READ_HEADER)
}

/// Read `blocks` media units starting at `sector`.
pub fn read_data<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    sector: u32,
    media_unit: u32,
    blocks: u32,
    dest: Dest<'_>,
) -> Result<usize> {
    // Byte address split over the low opcode byte and the next word.
    let cmd = [opcode::READ_DATA << 24 | sector >> 23, sector << 9, 0, 0];
    send_command(bus, limit, &cmd, Transfer::new(media_unit, blocks, dest), latency::READ_DATA)
}

/// Hand the cartridge the challenge words.
pub fn seed<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>, challenge: [u32; 2]) -> Result<()> {
    let cmd = command(opcode::SEED, 0, challenge[0], challenge[1]);
    send_command(bus, limit, &cmd, Transfer::new(0, 1, Dest::Discard), latency::SEED)?;
    Ok(())
}

/// One of the challenge commands that answer with a single word.
pub fn challenge<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    op: u32,
    challenge: [u32; 2],
) -> Result<u32> {
    let cmd = command(op, 0, challenge[0], challenge[1]);
    let mut out = [0u32; 1];
    send_command(bus, limit, &cmd, Transfer::new(4, 1, Dest::Words(&mut out)), latency::CHALLENGE)?;
    Ok(out[0])
}

pub fn confirm<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>, challenge: [u32; 2]) -> Result<()> {
    let cmd = command(opcode::CONFIRM, 0, challenge[0], challenge[1]);
    send_command(bus, limit, &cmd, Transfer::new(0, 1, Dest::Discard), latency::CONFIRM)?;
    Ok(())
}
