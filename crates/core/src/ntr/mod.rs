//! NTR (DS/DSi) cartridge protocol.

pub mod command;
pub mod header;
pub mod key1;
pub mod secure_area;
pub mod transport;
pub mod unlock;
