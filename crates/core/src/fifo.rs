//! Receive loop shared by both card controllers.

use crate::{
    bus::{spin_until, SlotBus},
    error::{Error, Result},
};

/// Where received words go.
///
/// `Words` stores each FIFO word directly, `Bytes` splits it little endian
/// into an arbitrary byte buffer. Anything past the end of the buffer is
/// still popped from the FIFO, then dropped.
pub enum Dest<'a> {
    Words(&'a mut [u32]),
    Bytes(&'a mut [u8]),
    Discard,
}

impl Dest<'_> {
    fn store(&mut self, word_i: usize, word: u32) {
        match self {
            Dest::Words(words) => {
                if let Some(w) = words.get_mut(word_i) {
                    *w = word;
                }
            }
            Dest::Bytes(bytes) => {
                let start = word_i * 4;
                if start < bytes.len() {
                    let end = (start + 4).min(bytes.len());
                    bytes[start..end].copy_from_slice(&word.to_le_bytes()[..end - start]);
                }
            }
            Dest::Discard => {}
        }
    }
}

/// Register layout of one controller's transfer machinery.
pub(crate) struct FifoPort {
    pub name: &'static str,
    pub cnt: u32,
    pub fifo: u32,
    pub busy: u32,
    pub ready: u32,
    /// Writes to `cnt` that pull chip select high after a short transfer.
    pub release: &'static [u32],
}

/// Drain up to `len` bytes of an already started transfer into `dest`.
///
/// Returns the number of bytes popped. The controller is idle when this
/// returns, also when the card delivered fewer bytes than asked for.
pub(crate) fn drain<B: SlotBus + ?Sized>(
    bus: &mut B,
    port: &FifoPort,
    len: usize,
    mut dest: Dest<'_>,
    limit: Option<u64>,
) -> Result<usize> {
    let mut count = 0;
    let mut idle_polls = 0u64;
    let mut cnt = bus.read32(port.cnt);

    while cnt & port.busy != 0 && count < len {
        cnt = bus.read32(port.cnt);
        if cnt & port.ready != 0 {
            dest.store(count / 4, bus.read32(port.fifo));
            count += 4;
            idle_polls = 0;
        } else {
            idle_polls += 1;
            if limit.is_some_and(|l| idle_polls >= l) {
                tracing::error!(port = port.name, count, len, "no data from card");
                return Err(Error::Stuck {
                    what: port.name,
                    polls: idle_polls,
                });
            }
        }
    }

    if count != len {
        // Releasing chip select in the middle of a word garbles the next
        // command, so wait for the word boundary first.
        tracing::debug!(port = port.name, count, len, "short transfer, releasing card");
        spin_until(bus, limit, port.name, |b| b.read32(port.cnt) & port.ready != 0)?;
        bus.delay(33);
        for &v in port.release {
            bus.write32(port.cnt, v);
        }
    }

    spin_until(bus, limit, port.name, |b| b.read32(port.cnt) & port.busy == 0)?;

    Ok(count)
}
