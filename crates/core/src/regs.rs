//! Register map of the cartridge slot, both card controllers and the AES
//! engine, as seen from the ARM9.

use bitflags::bitflags;

// Slot configuration
pub const CARDCONF: u32 = 0x1000_000C;
pub const CARDCONF2: u32 = 0x1000_0010;
/// Routes card data through the AES block. Exact semantics are undocumented.
pub const CARD_AES_ROUTE: u32 = 0x1000_0008;

// NTR controller
pub const NTR_MCNT: u32 = 0x1016_4000;
pub const NTR_ROMCNT: u32 = 0x1016_4004;
/// 8 command bytes, first byte sent at the lowest address.
pub const NTR_CMD: u32 = 0x1016_4008;
pub const NTR_SEED_X_LO: u32 = 0x1016_4010;
pub const NTR_SEED_Y_LO: u32 = 0x1016_4014;
pub const NTR_SEED_X_HI: u32 = 0x1016_4018;
pub const NTR_SEED_Y_HI: u32 = 0x1016_401A;
pub const NTR_FIFO: u32 = 0x1016_401C;

// CTR controller
pub const CTR_CNT: u32 = 0x1000_4000;
pub const CTR_BLKCNT: u32 = 0x1000_4004;
pub const CTR_SECCNT: u32 = 0x1000_4008;
pub const CTR_CMD_CRYPT: u32 = 0x1000_400C;
pub const CTR_SECSEED: u32 = 0x1000_4010;
/// 4 command words, least significant word at the lowest address.
pub const CTR_CMD: u32 = 0x1000_4020;
pub const CTR_FIFO: u32 = 0x1000_4030;

// AES engine
pub const AES_CNT: u32 = 0x1000_9000;
pub const AES_BLKCNT: u32 = 0x1000_9004;
pub const AES_WRFIFO: u32 = 0x1000_9008;
pub const AES_RDFIFO: u32 = 0x1000_900C;
pub const AES_KEYSEL: u32 = 0x1000_9010;
pub const AES_KEYCNT: u32 = 0x1000_9011;
pub const AES_CTR: u32 = 0x1000_9020;
pub const AES_MAC: u32 = 0x1000_9030;
pub const AES_KEYFIFO: u32 = 0x1000_9100;
pub const AES_KEYYFIFO: u32 = 0x1000_9108;

/// NTR_MCNT (16 bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NtrMcnt(u16);

bitflags! {
    impl NtrMcnt: u16 {
        const IRQ    = 0x4000;
        const ENABLE = 0x8000;
    }
}

/// NTR_ROMCNT (32 bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NtrRomCnt(u32);

bitflags! {
    impl NtrRomCnt: u32 {
        const SEC_DAT    = 1 << 13;
        const SEC_EN     = 1 << 14;
        const SEC_SEED   = 1 << 15;
        const SEC_CMD    = 1 << 22;
        const DATA_READY = 1 << 23;
        const CLK_SLOW   = 1 << 27;
        const SEC_LARGE  = 1 << 28;
        const NRESET     = 1 << 29;
        const WR         = 1 << 30;
        /// Write: start a transfer. Read: transfer in progress.
        const BUSY       = 1 << 31;

        const _ = !0;
    }
}

impl NtrRomCnt {
    pub const DELAY1_MASK: u32 = 0x1FFF;
    pub const DELAY2_MASK: u32 = 0x3F << 16;
    pub const BLK_SIZE_MASK: u32 = 7 << 24;

    pub const fn delay1(n: u32) -> u32 {
        n & Self::DELAY1_MASK
    }

    pub const fn delay2(n: u32) -> u32 {
        (n & 0x3F) << 16
    }

    pub const fn blk_size(code: u32) -> u32 {
        (code & 7) << 24
    }

    /// Latency used by the plain commands issued before KEY1 is active.
    pub const SLOW: u32 = Self::CLK_SLOW.bits() | Self::delay1(0x1FFF) | Self::delay2(0x18);
}

/// CTR_CNT (32 bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtrCnt(u32);

bitflags! {
    impl CtrCnt: u32 {
        const CRC_ERROR  = 1 << 4;
        const KEY_PARAM  = 1 << 24;
        const DATA_READY = 1 << 27;
        const NRESET     = 1 << 28;
        const WR         = 1 << 29;
        const IE         = 1 << 30;
        /// Write: start a transfer. Read: transfer in progress.
        const BUSY       = 1 << 31;

        const _ = !0;
    }
}

impl CtrCnt {
    pub const PAGE_SIZE_SHIFT: u32 = 16;
    pub const PAGE_SIZE_MASK: u32 = 0xF << Self::PAGE_SIZE_SHIFT;
}

/// CTR_SECCNT (32 bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtrSecCnt(u32);

bitflags! {
    impl CtrSecCnt: u32 {
        const APPLY_KEY  = 1 << 2;
        const READY      = 1 << 14;
        const LATCH_SEED = 1 << 15;

        const _ = !0;
    }
}

impl CtrSecCnt {
    pub const fn key_select(n: u32) -> u32 {
        (n & 3) << 8
    }
}

/// AES_CNT (32 bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AesCnt(u32);

bitflags! {
    impl AesCnt: u32 {
        const FLUSH_WRITE  = 1 << 10;
        const FLUSH_READ   = 1 << 11;
        const MAC_FROM_REG = 1 << 19;
        const MAC_VERIFY   = 1 << 20;
        const MAC_VALID    = 1 << 21;
        const OUT_BIG      = 1 << 22;
        const IN_BIG       = 1 << 23;
        const OUT_NORMAL   = 1 << 24;
        const IN_NORMAL    = 1 << 25;
        const UPDATE_KEY   = 1 << 26;
        const IRQ          = 1 << 30;
        const START        = 1 << 31;

        const _ = !0;
    }
}

impl AesCnt {
    pub const RD_COUNT_SHIFT: u32 = 5;
    pub const MAC_SIZE_SHIFT: u32 = 16;
    pub const MODE_SHIFT: u32 = 27;
    pub const MODE_MASK: u32 = 7 << Self::MODE_SHIFT;

    /// Number of words waiting in the read FIFO.
    pub const fn read_count(bits: u32) -> u32 {
        (bits >> Self::RD_COUNT_SHIFT) & 0x1F
    }
}
