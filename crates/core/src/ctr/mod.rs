//! CTR (3DS) cartridge protocol.

pub mod aes;
pub mod command;
pub mod ncsd;
pub mod transport;
pub mod unlock;
