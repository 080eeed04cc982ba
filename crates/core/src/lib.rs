#![allow(clippy::new_without_default, clippy::identity_op)]

pub mod bus;
pub mod config;
pub mod ctr;
pub mod entropy;
pub mod error;
pub mod fifo;
pub mod ntr;
pub mod regs;
pub mod slot;
