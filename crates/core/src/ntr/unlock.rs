//! The KEY1 unlock: from a freshly reset cartridge to KEY2 data reads of the
//! secure area.
//!
//! Every step has to run in exactly this order. The cartridge does not
//! report protocol errors, a misordered command just makes every following
//! read return garbage.

use crate::{
    bus::{us_to_cycles, SlotBus},
    entropy::Entropy,
    error::{Error, Result},
    fifo::Dest,
    regs::{self, NtrRomCnt},
};

use super::{
    command::{self, opcode, CommandSession},
    header::NtrHeader,
    key1::{CipherState, Generation, Key1Table, Stage},
    transport::send_command,
};

pub const SECURE_AREA_OFFSET: u32 = 0x4000;
pub const SECURE_AREA_SIZE: usize = 0x4000;

/// Read before the secure area to check KEY2 is up.
const VALIDATION_OFFSET: u32 = 0x8000;
const VALIDATION_SIZE: usize = 0x200;

/// Low byte of the KEY2 X seed, picked by the header's seed select.
const KEY2_SEED_BYTES: [u8; 8] = [0xE8, 0x4D, 0x5A, 0xB1, 0x17, 0x8F, 0x99, 0xD5];
const KEY2_SEED_Y: u64 = 0x5C_879B_9B05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NtrState {
    /// Just reset, plain commands only.
    Raw,
    /// KEY1 active with freshly drawn session parameters.
    KeyedRandom,
    /// KEY2 seeded, KEY1 still used for commands.
    SecureKeyed,
    /// Plain commands again, data KEY2 scrambled by the cartridge and
    /// descrambled by the controller.
    DataMode,
    /// Secure area has been read.
    Reading,
}

/// KEY2 X and Y seeds for a session.
pub fn key2_seeds(session: &CommandSession, seed_select: u8) -> (u64, u64) {
    let x = (session.mmm as u64 & 0xFFF) << 27
        | (session.nnn as u64 & 0xFFF) << 15
        | 0x6000
        | KEY2_SEED_BYTES[(seed_select & 7) as usize] as u64;
    (x, KEY2_SEED_Y)
}

pub struct NtrUnlock<'a, B: SlotBus + ?Sized> {
    bus: &'a mut B,
    limit: Option<u64>,
    header: &'a NtrHeader,
    chip_id: u32,
    generation: Generation,
    cipher: CipherState,
    session: CommandSession,
    state: NtrState,
}

impl<'a, B: SlotBus + ?Sized> NtrUnlock<'a, B> {
    pub fn new(
        bus: &'a mut B,
        limit: Option<u64>,
        header: &'a NtrHeader,
        chip_id: u32,
        base: &Key1Table,
        generation: Generation,
        entropy: &mut dyn Entropy,
    ) -> Self {
        Self {
            bus,
            limit,
            header,
            chip_id,
            generation,
            cipher: CipherState::new(base, header.game_code, Stage::Light),
            session: CommandSession::draw(entropy),
            state: NtrState::Raw,
        }
    }

    pub fn state(&self) -> NtrState {
        self.state
    }

    pub fn session(&self) -> &CommandSession {
        &self.session
    }

    /// Run every step in order and read the still KEY1 encrypted secure area
    /// into `out`. Returns whether the secure chip id matched.
    pub fn run(&mut self, out: &mut [u8]) -> Result<bool> {
        self.activate_key1()?;
        self.activate_secure()?;
        let id_ok = self.verify_chip_id()?;
        self.enter_data_mode()?;
        self.read_secure_area(out)?;
        Ok(id_ok)
    }

    /// Raw -> KeyedRandom
    pub fn activate_key1(&mut self) -> Result<()> {
        self.expect(NtrState::Raw, "activate KEY1")?;

        let cmd = self.session.activation(self.generation);
        let latency = self.header.normal_romcnt & (NtrRomCnt::WR | NtrRomCnt::CLK_SLOW).bits();
        send_command(&mut *self.bus, self.limit, cmd, 0, latency, Dest::Discard)?;

        self.transition(NtrState::KeyedRandom);
        Ok(())
    }

    /// KeyedRandom -> SecureKeyed, then seed KEY2.
    pub fn activate_secure(&mut self) -> Result<()> {
        self.expect(NtrState::KeyedRandom, "activate secure")?;

        let cmd = self.session.encrypted(&self.cipher, opcode::ACTIVATE_SECURE, 0);
        self.send_key1(cmd, self.key1_latency())?;

        self.seed_key2();
        self.transition(NtrState::SecureKeyed);
        Ok(())
    }

    /// Ask for the chip id under KEY1 and compare it to the one reported
    /// before the unlock. Real cartridges are inconsistent here, so a
    /// mismatch is only logged.
    pub fn verify_chip_id(&mut self) -> Result<bool> {
        self.expect(NtrState::SecureKeyed, "verify chip id")?;

        let cmd = self.session.encrypted(&self.cipher, opcode::SECURE_CHIP_ID, 0);
        let latency = self.key1_latency() | (NtrRomCnt::SEC_EN | NtrRomCnt::SEC_DAT).bits();
        let mut id = [0u32; 1];
        if self.large() {
            send_command(&mut *self.bus, self.limit, cmd, 0, latency, Dest::Discard)?;
            self.secure_delay();
        }
        send_command(&mut *self.bus, self.limit, cmd, 4, latency, Dest::Words(&mut id))?;

        let ok = id[0] == self.chip_id;
        if ok {
            tracing::debug!(chip_id = format_args!("{:08x}", id[0]), "secure chip id matches");
        } else {
            tracing::warn!(
                expected = format_args!("{:08x}", self.chip_id),
                got = format_args!("{:08x}", id[0]),
                "secure chip id mismatch, continuing"
            );
        }
        Ok(ok)
    }

    /// SecureKeyed -> DataMode
    pub fn enter_data_mode(&mut self) -> Result<()> {
        self.expect(NtrState::SecureKeyed, "enter data mode")?;

        let cmd = self.session.encrypted(&self.cipher, opcode::DATA_MODE, 0);
        let latency = self.key1_latency() | (NtrRomCnt::SEC_EN | NtrRomCnt::SEC_DAT).bits();
        self.send_key1(cmd, latency)?;

        self.transition(NtrState::DataMode);
        Ok(())
    }

    /// DataMode -> Reading. Fills `out` with the secure area as the
    /// controller hands it over, still under KEY1.
    pub fn read_secure_area(&mut self, out: &mut [u8]) -> Result<()> {
        self.expect(NtrState::DataMode, "read secure area")?;
        if out.len() < SECURE_AREA_SIZE {
            return Err(Error::BufferTooSmall {
                need: SECURE_AREA_SIZE,
                got: out.len(),
            });
        }

        let latency = self.normal_latency();
        send_command(
            &mut *self.bus,
            self.limit,
            command::plain(opcode::DATA_READ, VALIDATION_OFFSET),
            VALIDATION_SIZE,
            latency,
            Dest::Discard,
        )?;

        let granule = if self.large() { 0x200 } else { 0x1000 };
        for (i, chunk) in out[..SECURE_AREA_SIZE].chunks_mut(granule).enumerate() {
            let addr = SECURE_AREA_OFFSET + (i * granule) as u32;
            let cmd = command::plain(opcode::DATA_READ, addr);
            send_command(&mut *self.bus, self.limit, cmd, granule, latency, Dest::Bytes(chunk))?;
        }

        self.transition(NtrState::Reading);
        Ok(())
    }

    fn expect(&self, want: NtrState, step: &'static str) -> Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(Error::OutOfOrder {
                step,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: NtrState) {
        tracing::debug!(from = ?self.state, ?to, "NTR unlock");
        self.state = to;
    }

    /// Cartridges with the top chip id bit set need the header's delay and a
    /// resend after some KEY1 commands. The others take a 4 byte dummy read.
    fn large(&self) -> bool {
        self.chip_id & 0x8000_0000 != 0
    }

    fn send_key1(&mut self, cmd: [u8; 8], latency: u32) -> Result<()> {
        if self.large() {
            send_command(&mut *self.bus, self.limit, cmd, 0, latency, Dest::Discard)?;
            self.secure_delay();
            send_command(&mut *self.bus, self.limit, cmd, 0, latency, Dest::Discard)?;
        } else {
            send_command(&mut *self.bus, self.limit, cmd, 4, latency, Dest::Discard)?;
        }
        Ok(())
    }

    fn secure_delay(&mut self) {
        self.bus.delay(us_to_cycles(self.header.secure_area_delay_us()));
    }

    fn seed_key2(&mut self) {
        let (x, y) = key2_seeds(&self.session, self.header.seed_select);
        tracing::debug!(x = format_args!("{x:010x}"), y = format_args!("{y:010x}"), "KEY2 seed");

        self.bus.write32(regs::NTR_ROMCNT, 0);
        self.bus.write32(regs::NTR_SEED_X_LO, x as u32);
        self.bus.write32(regs::NTR_SEED_Y_LO, y as u32);
        self.bus.write16(regs::NTR_SEED_X_HI, (x >> 32) as u16);
        self.bus.write16(regs::NTR_SEED_Y_HI, (y >> 32) as u16);
        self.bus.write32(
            regs::NTR_ROMCNT,
            (NtrRomCnt::NRESET | NtrRomCnt::SEC_SEED | NtrRomCnt::SEC_EN | NtrRomCnt::SEC_DAT).bits(),
        );
    }

    /// ROMCNT bits for KEY1 commands: the header's KEY1 timing with the KEY1
    /// gap folded into DELAY1.
    fn key1_latency(&self) -> u32 {
        let normal = self.header.normal_romcnt;
        let key1 = self.header.key1_romcnt;
        (normal & (NtrRomCnt::WR | NtrRomCnt::CLK_SLOW).bits())
            | ((key1 & (NtrRomCnt::CLK_SLOW.bits() | NtrRomCnt::DELAY1_MASK))
                + ((key1 & NtrRomCnt::DELAY2_MASK) >> 16))
    }

    fn normal_latency(&self) -> u32 {
        self.header.normal_romcnt & !NtrRomCnt::BLK_SIZE_MASK
    }
}
