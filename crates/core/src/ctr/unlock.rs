//! CTR secure handshake.
//!
//! Authenticates the header block on the AES engine, installs the resulting
//! key and a challenge as seeds of the controller's descrambler, then proves
//! both sides agree by echoing identity words.

use crate::{
    bus::{spin_until, SlotBus},
    config::SlotConfig,
    entropy::Entropy,
    error::Result,
    regs::{self, CtrSecCnt},
};

use super::{
    aes::{run_session, AesSessionResult, KeySource, SESSION_WORDS},
    command::{self, opcode},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtrHandshake {
    pub session: AesSessionResult,
    pub challenge: [u32; 2],
    /// Answer to the first challenge, should equal the chip id.
    pub id_response: u32,
    /// Answer to the second challenge, should equal the probe response.
    pub caps_response: u32,
    /// Whether both answers matched and the confirmation was sent.
    pub confirmed: bool,
}

/// Run the handshake. `chip_id` and `probe` are the answers the cartridge
/// gave to the plain chip id and CTR probe commands during slot init.
pub fn secure_init<B: SlotBus + ?Sized>(
    bus: &mut B,
    config: &SlotConfig,
    header: &[u32; SESSION_WORDS],
    chip_id: u32,
    probe: u32,
    entropy: &mut dyn Entropy,
) -> Result<CtrHandshake> {
    let limit = config.spin_limit;

    let session = run_session(bus, limit, header, KeySource::from_probe(probe))?;
    bus.delay(config.ctr_aes_delay);

    set_sec_key(bus, limit, probe)?;
    let mut seed = session.key;
    set_sec_seed(bus, limit, &seed, true)?;

    let challenge = [entropy.next_word(), entropy.next_word()];
    command::seed(bus, limit, challenge)?;

    seed[2] = challenge[0].swap_bytes();
    seed[3] = challenge[1].swap_bytes();
    set_sec_seed(bus, limit, &seed, false)?;

    let id_response = command::challenge(bus, limit, opcode::SECURE_ID, challenge)?;
    let caps_response = command::challenge(bus, limit, opcode::SECURE_CAPS, challenge)?;

    let confirmed = id_response == chip_id && caps_response == probe;
    if confirmed {
        command::confirm(bus, limit, challenge)?;
        tracing::debug!("CTR handshake confirmed");
    } else {
        tracing::warn!(
            id = format_args!("{id_response:08x}/{chip_id:08x}"),
            caps = format_args!("{caps_response:08x}/{probe:08x}"),
            "CTR challenge mismatch, continuing"
        );
    }

    // Some cartridges answer the first few commands after the handshake with
    // stale data.
    for _ in 0..config.ctr_settle_retries {
        command::challenge(bus, limit, opcode::SECURE_ID, challenge)?;
        bus.delay(config.ctr_retry_delay);
    }

    Ok(CtrHandshake {
        session,
        challenge,
        id_response,
        caps_response,
        confirmed,
    })
}

/// Resend the first challenge. Needed before reads on cartridges that
/// otherwise return one stale encrypted response.
pub fn dummy<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>, challenge: [u32; 2]) -> Result<()> {
    command::challenge(bus, limit, opcode::SECURE_ID, challenge)?;
    Ok(())
}

fn set_sec_key<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>, index: u32) -> Result<()> {
    let v = bus.read32(regs::CTR_SECCNT);
    bus.write32(
        regs::CTR_SECCNT,
        v | CtrSecCnt::key_select(index) | CtrSecCnt::APPLY_KEY.bits(),
    );
    wait_sec_ready(bus, limit)
}

fn set_sec_seed<B: SlotBus + ?Sized>(
    bus: &mut B,
    limit: Option<u64>,
    seed: &[u32; 4],
    encrypt_commands: bool,
) -> Result<()> {
    for &w in seed.iter().rev() {
        bus.write32(regs::CTR_SECSEED, w.swap_bytes());
    }
    let v = bus.read32(regs::CTR_SECCNT);
    bus.write32(regs::CTR_SECCNT, v | CtrSecCnt::LATCH_SEED.bits());
    wait_sec_ready(bus, limit)?;

    if encrypt_commands {
        bus.write32(regs::CTR_CMD_CRYPT, 1);
    }
    Ok(())
}

fn wait_sec_ready<B: SlotBus + ?Sized>(bus: &mut B, limit: Option<u64>) -> Result<()> {
    spin_until(bus, limit, "CTR_SECCNT", |b| {
        b.read32(regs::CTR_SECCNT) & CtrSecCnt::READY.bits() != 0
    })
}
