use bitfield_struct::bitfield;

use crate::entropy::Entropy;

use super::key1::{CipherState, Generation};

pub mod opcode {
    // Plain commands
    pub const READ_HEADER: u8 = 0x00;
    pub const ACTIVATE_KEY1: u8 = 0x3C;
    pub const ACTIVATE_KEY1_TWL: u8 = 0x3D;
    pub const ENTER_16_BYTE: u8 = 0x3E;
    pub const CHIP_ID: u8 = 0x90;
    pub const RESET: u8 = 0x9F;
    /// Capability probe understood only by CTR cartridges.
    pub const CTR_PROBE: u8 = 0xA0;

    // KEY1 commands, only the high nibble is sent
    pub const SECURE_CHIP_ID: u8 = 0x10;
    pub const SECURE_READ: u8 = 0x20;
    pub const ACTIVATE_SECURE: u8 = 0x40;
    pub const DATA_MODE: u8 = 0xA0;

    // KEY2 (data mode) commands
    pub const DATA_READ: u8 = 0xB7;
    pub const DATA_CHIP_ID: u8 = 0xB8;
}

/// Plaintext of a KEY1 command, most significant byte is sent first.
///
/// `cmd` holds the opcode's high nibble; the low nibble on the wire is the
/// top of `block`.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Key1Frame {
    #[bits(20)]
    pub counter: u32,
    #[bits(12)]
    pub jjj: u16,
    #[bits(12)]
    pub iii: u16,
    pub block: u16,
    #[bits(4)]
    pub cmd: u8,
}

/// Plaintext of the unencrypted "activate KEY1" command.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct ActivateFrame {
    #[bits(8)]
    _zero: u8,
    #[bits(20)]
    pub counter: u32,
    #[bits(4)]
    _pad: u8,
    #[bits(12)]
    pub jjj: u16,
    #[bits(12)]
    pub iii: u16,
    pub opcode: u8,
}

/// Per-cartridge KEY1 command parameters.
///
/// `iii`/`jjj` go into ordinary commands, `mmm`/`nnn` into "activate secure"
/// and later seed KEY2. `llll` fills the block field of every command except
/// secure reads. `kkkkk` is a 20 bit counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandSession {
    pub iii: u16,
    pub jjj: u16,
    pub kkkkk: u32,
    pub llll: u16,
    pub mmm: u16,
    pub nnn: u16,
}

impl CommandSession {
    pub fn draw(entropy: &mut dyn Entropy) -> Self {
        Self {
            iii: (entropy.next_word() & 0xFFF) as u16,
            jjj: (entropy.next_word() & 0xFFF) as u16,
            kkkkk: entropy.next_word() & 0xF_FFFF,
            llll: (entropy.next_word() & 0xFFFF) as u16,
            mmm: (entropy.next_word() & 0xFFF) as u16,
            nnn: (entropy.next_word() & 0xFFF) as u16,
        }
    }

    /// The unencrypted command that switches the cartridge into KEY1 mode.
    pub fn activation(&self, generation: Generation) -> [u8; 8] {
        let opcode = match generation {
            Generation::Ntr => opcode::ACTIVATE_KEY1,
            Generation::Twl => opcode::ACTIVATE_KEY1_TWL,
        };

        ActivateFrame::new()
            .with_opcode(opcode)
            .with_iii(self.iii & 0xFFF)
            .with_jjj(self.jjj & 0xFFF)
            .with_counter(self.kkkkk & 0xF_FFFF)
            .into_bits()
            .to_be_bytes()
    }

    /// Pack `op` into a plaintext frame. `block` is only used by secure reads,
    /// which also advance the counter.
    pub fn frame(&mut self, op: u8, block: u16) -> Key1Frame {
        let block = if op == opcode::SECURE_READ { block } else { self.llll };
        let (iii, jjj) = if op == opcode::ACTIVATE_SECURE {
            (self.mmm, self.nnn)
        } else {
            (self.iii, self.jjj)
        };

        let frame = Key1Frame::new()
            .with_cmd(op >> 4)
            .with_block(block)
            .with_iii(iii & 0xFFF)
            .with_jjj(jjj & 0xFFF)
            .with_counter(self.kkkkk & 0xF_FFFF);

        if op == opcode::SECURE_READ {
            self.kkkkk = self.kkkkk.wrapping_add(1) & 0xF_FFFF;
        }

        frame
    }

    /// Build and encrypt `op`, ready for the command register.
    pub fn encrypted(&mut self, cipher: &CipherState, op: u8, block: u16) -> [u8; 8] {
        let plain = self.frame(op, block).into_bits();
        tracing::trace!(op, plain = format_args!("{plain:016x}"), "KEY1 command");
        cipher.encrypt_u64(plain).to_be_bytes()
    }
}

/// A plain command with the opcode in the first byte and `arg` big endian in
/// the following four.
pub fn plain(op: u8, arg: u32) -> [u8; 8] {
    ((op as u64) << 56 | (arg as u64) << 24).to_be_bytes()
}
