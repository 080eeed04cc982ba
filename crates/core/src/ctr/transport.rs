use crate::{
    bus::SlotBus,
    error::Result,
    fifo::{self, Dest, FifoPort},
    regs::{self, CtrCnt},
};

const PORT: FifoPort = FifoPort {
    name: "CTR_CNT",
    cnt: regs::CTR_CNT,
    fifo: regs::CTR_FIFO,
    busy: CtrCnt::BUSY.bits(),
    ready: CtrCnt::DATA_READY.bits(),
    release: &[
        CtrCnt::NRESET.bits(),
        CtrCnt::KEY_PARAM.bits() | CtrCnt::BUSY.bits() | CtrCnt::NRESET.bits(),
    ],
};

/// Page sizes the CTR controller can transfer per block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSize {
    P0,
    P4,
    P64,
    P512,
    P1K,
    P2K,
    P4K,
}

impl PageSize {
    /// Round `bytes` down to a word and pick the matching page size. Anything
    /// that is not a hardware size becomes 4 KiB.
    pub fn classify(bytes: u32) -> Self {
        match bytes & !3 {
            0 => PageSize::P0,
            4 => PageSize::P4,
            64 => PageSize::P64,
            512 => PageSize::P512,
            1024 => PageSize::P1K,
            2048 => PageSize::P2K,
            4096 => PageSize::P4K,
            other => {
                tracing::trace!(requested = other, "unsupported CTR page size, using 4096");
                PageSize::P4K
            }
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            PageSize::P0 => 0,
            PageSize::P4 => 4,
            PageSize::P64 => 64,
            PageSize::P512 => 512,
            PageSize::P1K => 1024,
            PageSize::P2K => 2048,
            PageSize::P4K => 4096,
        }
    }

    /// Value of the CNT page size field.
    pub fn code(self) -> u32 {
        match self {
            PageSize::P0 => 0,
            PageSize::P4 => 1,
            PageSize::P64 => 3,
            PageSize::P512 => 4,
            PageSize::P1K => 5,
            PageSize::P2K => 6,
            PageSize::P4K => 7,
        }
    }
}

/// One CTR transfer: `blocks` pages of `page` bytes each. Zero blocks are
/// sent as one.
pub struct Transfer<'a> {
    pub page: PageSize,
    pub blocks: u32,
    pub dest: Dest<'a>,
}

impl<'a> Transfer<'a> {
    pub fn new(page_bytes: u32, blocks: u32, dest: Dest<'a>) -> Self {
        Self {
            page: PageSize::classify(page_bytes),
            blocks: blocks.max(1),
            dest,
        }
    }

    /// Bytes the card is expected to send.
    pub fn len(&self) -> usize {
        self.page.bytes() as usize * self.blocks.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Send a 16 byte command and drain its response.
///
/// `command[0]` is the most significant word, the one carrying the opcode.
/// Returns the number of bytes received.
pub fn send_command<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    command: &[u32; 4],
    transfer: Transfer<'_>,
    latency: u32,
) -> Result<usize> {
    tracing::trace!(
        cmd = format_args!("{:08x?}", command),
        page = transfer.page.bytes(),
        blocks = transfer.blocks,
        "CTR command"
    );

    for (i, w) in command.iter().rev().enumerate() {
        bus.write32(regs::CTR_CMD + 4 * i as u32, *w);
    }

    let blocks = transfer.blocks.max(1);
    let len = transfer.len();
    bus.write32(regs::CTR_BLKCNT, blocks - 1);

    bus.write32(regs::CTR_CNT, CtrCnt::NRESET.bits());
    bus.write32(
        regs::CTR_CNT,
        CtrCnt::BUSY.bits()
            | CtrCnt::NRESET.bits()
            | transfer.page.code() << CtrCnt::PAGE_SIZE_SHIFT
            | latency,
    );

    fifo::drain(bus, &PORT, len, transfer.dest, limit)
}
