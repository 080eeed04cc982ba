use crate::{
    bus::{spin_until, SlotBus},
    error::Result,
    fifo::{self, Dest, FifoPort},
    regs::{self, NtrMcnt, NtrRomCnt},
};

const PORT: FifoPort = FifoPort {
    name: "NTR_ROMCNT",
    cnt: regs::NTR_ROMCNT,
    fifo: regs::NTR_FIFO,
    busy: NtrRomCnt::BUSY.bits(),
    ready: NtrRomCnt::DATA_READY.bits(),
    release: &[NtrRomCnt::NRESET.bits()],
};

/// Map a byte count to the ROMCNT block size code and the number of bytes
/// the card will actually send. Unknown sizes read one 4 KiB page.
pub fn block_size(bytes: usize) -> (u32, usize) {
    match bytes & !3 {
        0 => (0, 0),
        4 => (7, 4),
        0x200 => (1, 0x200),
        0x400 => (2, 0x400),
        0x800 => (3, 0x800),
        0x1000 => (4, 0x1000),
        0x2000 => (5, 0x2000),
        0x4000 => (6, 0x4000),
        other => {
            tracing::trace!(requested = other, "unsupported NTR block size, using 0x1000");
            (4, 0x1000)
        }
    }
}

/// Send one 8 byte command and collect `bytes` of response.
///
/// `latency` carries the ROMCNT timing and KEY2 bits; start, reset and block
/// size are filled in here.
pub fn send_command<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    cmd: [u8; 8],
    bytes: usize,
    latency: u32,
    dest: Dest<'_>,
) -> Result<usize> {
    tracing::trace!(cmd = format_args!("{:016x}", u64::from_be_bytes(cmd)), bytes, "NTR command");

    bus.write16(regs::NTR_MCNT, NtrMcnt::ENABLE.bits());
    for (i, b) in cmd.iter().enumerate() {
        bus.write8(regs::NTR_CMD + i as u32, *b);
    }

    let (code, len) = block_size(bytes);
    let latency = latency & !(NtrRomCnt::BUSY.bits() | NtrRomCnt::NRESET.bits() | NtrRomCnt::BLK_SIZE_MASK);
    bus.write32(
        regs::NTR_ROMCNT,
        NtrRomCnt::BUSY.bits() | NtrRomCnt::NRESET.bits() | NtrRomCnt::blk_size(code) | latency,
    );

    fifo::drain(bus, &PORT, len, dest, limit)
}

/// Wait for a transfer started elsewhere (e.g. the controller reset) to end.
pub fn wait_idle<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>) -> Result<()> {
    spin_until(bus, limit, "NTR_ROMCNT", |b| {
        b.read32(regs::NTR_ROMCNT) & NtrRomCnt::BUSY.bits() == 0
    })
}
