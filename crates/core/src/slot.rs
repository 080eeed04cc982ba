//! The cartridge slot as a whole: power-up, identification and the per
//! protocol dump entry points.

use crate::{
    bus::{spin_until, SlotBus},
    config::SlotConfig,
    ctr::{
        self,
        aes::SESSION_WORDS,
        ncsd::{self, NcsdHeader},
        unlock::CtrHandshake,
    },
    entropy::Entropy,
    error::{Error, Result},
    fifo::Dest,
    ntr::{
        self,
        command::{self, opcode},
        header::NtrHeader,
        key1::{Generation, Key1Tables},
        secure_area::{self, SecureAreaStatus},
        unlock::{NtrUnlock, SECURE_AREA_OFFSET, SECURE_AREA_SIZE},
    },
    regs::{self, CtrCnt, CtrSecCnt, NtrMcnt, NtrRomCnt},
};

/// First part of an NTR image the unlock can produce: header, unreadable
/// gap and secure area.
pub const NTR_HEAD_SIZE: usize = 0x8000;
/// Header area at the start of an NTR image (TWL headers use all of it).
const NTR_HEADER_AREA: usize = 0x1000;

/// Chip id bit of cartridges that also speak the CTR protocol.
const CHIP_ID_CTR_CAPABLE: u32 = 0x1000_0000;
const CHIP_ID_CTR: u32 = 0x8000_0000;

/// Bytes requested per read while dumping a region.
const CTR_CHUNK_BYTES: u32 = 0x10_0000;

const CARDCONF_CTRL_MASK: u32 = 3;
const CARDCONF_CTRL_CTR: u32 = 2;
const CARDCONF_NTR_ROUTE: u32 = 0x100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CartKind {
    None,
    Ntr,
    Ctr,
}

impl CartKind {
    pub fn from_chip_id(chip_id: u32) -> Self {
        match chip_id {
            0 | 0xFFFF_FFFF => CartKind::None,
            id if id & CHIP_ID_CTR != 0 => CartKind::Ctr,
            _ => CartKind::Ntr,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NtrDump {
    pub header: NtrHeader,
    /// Header, zeroed gap and decrypted secure area.
    pub head: Vec<u8>,
    pub chip_id_ok: bool,
    pub secure_area: SecureAreaStatus,
}

pub struct CardSlot<B: SlotBus> {
    pub bus: B,
    pub config: SlotConfig,
    chip_id: u32,
    /// Answer to the CTR probe, kept for the handshake.
    ctr_probe: u32,
    handshake: Option<CtrHandshake>,
}

impl<B: SlotBus> CardSlot<B> {
    pub fn new(bus: B, config: SlotConfig) -> Self {
        Self {
            bus,
            config,
            chip_id: 0xFFFF_FFFF,
            ctr_probe: 0xFFFF_FFFF,
            handshake: None,
        }
    }

    pub fn chip_id(&self) -> u32 {
        self.chip_id
    }

    pub fn ctr_probe(&self) -> u32 {
        self.ctr_probe
    }

    pub fn kind(&self) -> CartKind {
        CartKind::from_chip_id(self.chip_id)
    }

    pub fn handshake(&self) -> Option<&CtrHandshake> {
        self.handshake.as_ref()
    }

    /// Power cycle the slot, identify the cartridge and leave the matching
    /// controller selected.
    pub fn init(&mut self) -> Result<CartKind> {
        let limit = self.config.spin_limit;
        self.handshake = None;

        self.reset_slot()?;

        let v = self.bus.read32(regs::CTR_SECCNT);
        self.bus.write32(regs::CTR_SECCNT, v & !CtrSecCnt::APPLY_KEY.bits());
        self.bus.delay(0x30000);

        self.switch_to_ntr();
        self.bus.delay(0x30000);

        self.bus.write32(regs::NTR_ROMCNT, 0);
        let mcnt = self.bus.read16(regs::NTR_MCNT);
        self.bus.write16(regs::NTR_MCNT, mcnt & 0xFF);
        self.bus.delay(0x40000);

        let mcnt = self.bus.read16(regs::NTR_MCNT);
        self.bus
            .write16(regs::NTR_MCNT, mcnt | (NtrMcnt::ENABLE | NtrMcnt::IRQ).bits());
        self.bus
            .write32(regs::NTR_ROMCNT, (NtrRomCnt::NRESET | NtrRomCnt::SEC_SEED).bits());
        ntr::transport::wait_idle(&mut self.bus, limit)?;

        self.plain(opcode::RESET, 0x2000, NtrRomCnt::SLOW, Dest::Discard)?;
        let mut id = [0xFFFF_FFFFu32; 1];
        self.plain(opcode::CHIP_ID, 4, NtrRomCnt::SLOW, Dest::Words(&mut id))?;
        self.chip_id = id[0];
        tracing::info!(chip_id = format_args!("{:08x}", self.chip_id), "cartridge identified");

        if self.chip_id & CHIP_ID_CTR_CAPABLE != 0 {
            let mut probe = [0xFFFF_FFFFu32; 1];
            self.plain(opcode::CTR_PROBE, 4, 0, Dest::Words(&mut probe))?;
            self.ctr_probe = probe[0];
            tracing::debug!(probe = format_args!("{:08x}", self.ctr_probe), "CTR probe");

            self.plain(opcode::ENTER_16_BYTE, 0, 0, Dest::Discard)?;
            self.switch_to_ctr();
            self.bus.delay(0xF000);
            self.bus.write32(regs::CTR_BLKCNT, 0);
        }

        let kind = self.kind();
        if kind == CartKind::None {
            tracing::warn!("no cartridge found");
        }
        Ok(kind)
    }

    /// Read the plaintext NTR header.
    pub fn read_ntr_header(&mut self, out: &mut [u8]) -> Result<NtrHeader> {
        self.require(CartKind::Ntr)?;
        if out.len() < ntr::header::HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                need: ntr::header::HEADER_SIZE,
                got: out.len(),
            });
        }

        self.plain(
            opcode::READ_HEADER,
            ntr::header::HEADER_SIZE,
            NtrRomCnt::SLOW,
            Dest::Bytes(out),
        )?;
        NtrHeader::parse(out)
    }

    /// Read the header, unlock the cartridge and decrypt the secure area.
    ///
    /// Without an explicit `generation` the base table follows the header's
    /// unit code.
    pub fn dump_ntr_head(
        &mut self,
        tables: &Key1Tables,
        generation: Option<Generation>,
        entropy: &mut dyn Entropy,
    ) -> Result<NtrDump> {
        // Everything between the header and the secure area is unreadable
        // and stays zero.
        let mut head = vec![0u8; NTR_HEAD_SIZE];
        let header = self.read_ntr_header(&mut head[..NTR_HEADER_AREA])?;
        log_geometry(&header, self.chip_id);

        let generation = generation.unwrap_or_else(|| header.generation());
        tracing::debug!(?generation, unit_code = header.unit_code, "KEY1 base table");

        let base = tables.select(generation);
        let area = &mut head[SECURE_AREA_OFFSET as usize..][..SECURE_AREA_SIZE];
        let chip_id_ok = {
            let mut unlock = NtrUnlock::new(
                &mut self.bus,
                self.config.spin_limit,
                &header,
                self.chip_id,
                base,
                generation,
                entropy,
            );
            unlock.run(area)?
        };

        let status = secure_area::decrypt(area, base, header.game_code)?;
        tracing::info!(?status, "secure area read");

        Ok(NtrDump {
            header,
            head,
            chip_id_ok,
            secure_area: status,
        })
    }

    /// Read the plaintext CTR initial header (the first NCCH header).
    pub fn ctr_read_header(&mut self, out: &mut [u32]) -> Result<()> {
        self.require(CartKind::Ctr)?;
        ctr::command::read_header(&mut self.bus, self.config.spin_limit, Dest::Words(out))?;
        Ok(())
    }

    /// Run the secure handshake with the header block read by
    /// [`CardSlot::ctr_read_header`].
    pub fn ctr_secure_init(&mut self, header: &[u32], entropy: &mut dyn Entropy) -> Result<CtrHandshake> {
        self.require(CartKind::Ctr)?;
        let block: &[u32; SESSION_WORDS] = header
            .get(..SESSION_WORDS)
            .and_then(|s| s.try_into().ok())
            .ok_or(Error::BufferTooSmall {
                need: SESSION_WORDS * 4,
                got: header.len() * 4,
            })?;

        let handshake = ctr::unlock::secure_init(
            &mut self.bus,
            &self.config,
            block,
            self.chip_id,
            self.ctr_probe,
            entropy,
        )?;
        self.handshake = Some(handshake);
        Ok(handshake)
    }

    /// Resend the first challenge of the last handshake.
    pub fn ctr_dummy(&mut self) -> Result<()> {
        let challenge = self.ctr_challenge()?;
        ctr::unlock::dummy(&mut self.bus, self.config.spin_limit, challenge)
    }

    /// Read `blocks` media units from `sector` on.
    pub fn ctr_read_data(&mut self, sector: u32, media_unit: u32, blocks: u32, dest: Dest<'_>) -> Result<usize> {
        self.require(CartKind::Ctr)?;
        ctr::command::read_data(&mut self.bus, self.config.spin_limit, sector, media_unit, blocks, dest)
    }

    /// Read media units `start..end` into `out` in chunks of 1 MiB, the last
    /// one shortened to what is left. Two dummy commands go before every
    /// chunk. Returns the number of bytes the cartridge delivered.
    pub fn ctr_read_region(&mut self, start: u32, end: u32, media_unit: u32, out: &mut [u8]) -> Result<usize> {
        self.require(CartKind::Ctr)?;
        let need = end.saturating_sub(start) as usize * media_unit as usize;
        if out.len() < need {
            return Err(Error::BufferTooSmall { need, got: out.len() });
        }

        let chunk = (CTR_CHUNK_BYTES / media_unit.max(1)).max(1);
        let mut sector = start;
        let mut offset = 0;
        let mut received = 0;
        while sector < end {
            let blocks = chunk.min(end - sector);
            let bytes = blocks as usize * media_unit as usize;
            tracing::debug!(
                sector = format_args!("{sector:08x}"),
                end = format_args!("{end:08x}"),
                "reading CTR chunk"
            );

            self.ctr_dummy()?;
            self.ctr_dummy()?;
            received += self.ctr_read_data(sector, media_unit, blocks, Dest::Bytes(&mut out[offset..offset + bytes]))?;

            offset += bytes;
            sector += blocks;
        }
        Ok(received)
    }

    /// Read the NCSD header from sector 0. Assumes 0x200 byte media units
    /// until the header says otherwise.
    pub fn ctr_read_ncsd(&mut self) -> Result<NcsdHeader> {
        let mut bin = vec![0u8; 0x1000];
        self.ctr_dummy()?;
        self.ctr_read_data(0, 0x200, 0x1000 / 0x200, Dest::Bytes(&mut bin))?;
        let ncsd = NcsdHeader::parse(&bin)?;
        tracing::info!(
            media_unit = ncsd.media_unit(),
            used_mib = ncsd.used_bytes() >> 20,
            "NCSD header read"
        );
        Ok(ncsd)
    }

    fn ctr_challenge(&self) -> Result<[u32; 2]> {
        self.require(CartKind::Ctr)?;
        // Zero until a handshake has run.
        Ok(self.handshake.map(|h| h.challenge).unwrap_or_default())
    }

    fn require(&self, kind: CartKind) -> Result<()> {
        match self.kind() {
            CartKind::None => Err(Error::NoCartridge(self.chip_id)),
            k if k == kind => Ok(()),
            _ => Err(Error::WrongProtocol {
                expected: match kind {
                    CartKind::Ctr => "CTR",
                    _ => "NTR",
                },
            }),
        }
    }

    fn plain(&mut self, op: u8, bytes: usize, latency: u32, dest: Dest<'_>) -> Result<usize> {
        ntr::transport::send_command(
            &mut self.bus,
            self.config.spin_limit,
            command::plain(op, 0),
            bytes,
            latency,
            dest,
        )
    }

    fn reset_slot(&mut self) -> Result<()> {
        let limit = self.config.spin_limit;

        self.bus.write8(regs::CARDCONF2, 0x0C);
        self.modify_cardconf(|v| v & !CARDCONF_CTRL_MASK);
        spin_until(&mut self.bus, limit, "CARDCONF2", |b| b.read8(regs::CARDCONF2) == 0)?;

        for state in [0x04u8, 0x08] {
            self.bus.write8(regs::CARDCONF2, state);
            spin_until(&mut self.bus, limit, "CARDCONF2", |b| b.read8(regs::CARDCONF2) == state)?;
        }
        Ok(())
    }

    fn switch_to_ntr(&mut self) {
        self.bus.write32(regs::NTR_ROMCNT, NtrRomCnt::NRESET.bits());
        self.modify_cardconf(|v| v & !CARDCONF_CTRL_MASK & !CARDCONF_NTR_ROUTE);
        self.bus.write16(regs::NTR_MCNT, NtrMcnt::ENABLE.bits());
    }

    fn switch_to_ctr(&mut self) {
        self.bus.write32(regs::CTR_CNT, CtrCnt::NRESET.bits());
        self.modify_cardconf(|v| (v & !CARDCONF_CTRL_MASK) | CARDCONF_CTRL_CTR);
    }

    fn modify_cardconf(&mut self, f: impl FnOnce(u32) -> u32) {
        let v = self.bus.read16(regs::CARDCONF) as u32;
        self.bus.write16(regs::CARDCONF, f(v) as u16);
    }
}

fn log_geometry(header: &NtrHeader, chip_id: u32) {
    let id_size = (chip_id >> 8) & 0xFF;
    let id_mib = (id_size < 0xF0).then_some(id_size + 1);
    tracing::info!(
        title = %header.title,
        game_code = %header.game_code_str(),
        rev = header.rom_version,
        "NTR header"
    );
    tracing::info!(
        chip_mib = ?id_mib,
        rom_kib = header.rom_size_bytes() >> 10,
        used_kib = header.total_used_rom_size >> 10,
        "NTR geometry"
    );
    if !header.logo_ok() {
        tracing::warn!(crc = format_args!("{:04x}", header.logo_crc), "unexpected logo checksum");
    }
}

/// Whether a CTR initial header carries the NCCH magic.
pub fn is_ncch(header: &[u8]) -> bool {
    ncsd::has_magic(header, ncsd::NCCH_MAGIC)
}
