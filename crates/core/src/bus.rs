use crate::error::{Error, Result};

/// Access to the slot's memory-mapped registers.
///
/// Addresses are absolute (see [`crate::regs`]). Implementations must not
/// reorder or merge accesses: several registers are FIFOs or have write side
/// effects, and the protocols depend on every access happening exactly once
/// and in program order.
pub trait SlotBus {
    fn read8(&mut self, addr: u32) -> u8;

    fn read16(&mut self, addr: u32) -> u16;

    fn read32(&mut self, addr: u32) -> u32;

    fn write8(&mut self, addr: u32, v: u8);

    fn write16(&mut self, addr: u32, v: u16);

    fn write32(&mut self, addr: u32, v: u32);

    /// Busy-wait for roughly `cycles` ARM9 cycles.
    fn delay(&mut self, cycles: u32);
}

impl<B: SlotBus + ?Sized> SlotBus for &mut B {
    fn read8(&mut self, addr: u32) -> u8 {
        (**self).read8(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        (**self).read16(addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        (**self).read32(addr)
    }

    fn write8(&mut self, addr: u32, v: u8) {
        (**self).write8(addr, v)
    }

    fn write16(&mut self, addr: u32, v: u16) {
        (**self).write16(addr, v)
    }

    fn write32(&mut self, addr: u32, v: u32) {
        (**self).write32(addr, v)
    }

    fn delay(&mut self, cycles: u32) {
        (**self).delay(cycles)
    }
}

/// Poll `cond` until it holds.
///
/// With `limit == None` this never gives up, which is what the hardware
/// expects. A bounded limit turns a stuck flag into [`Error::Stuck`].
pub fn spin_until<B, F>(bus: &mut B, limit: Option<u64>, what: &'static str, mut cond: F) -> Result<()>
where
    B: SlotBus + ?Sized,
    F: FnMut(&mut B) -> bool,
{
    let mut polls = 0u64;
    while !cond(bus) {
        polls += 1;
        if let Some(limit) = limit {
            if polls >= limit {
                tracing::error!(what, polls, "status flag stuck, reinsert the cartridge");
                return Err(Error::Stuck { what, polls });
            }
        }
    }
    Ok(())
}

/// Microseconds to ARM9 cycles at 134 MHz.
pub(crate) fn us_to_cycles(us: u32) -> u32 {
    us.saturating_mul(134)
}
