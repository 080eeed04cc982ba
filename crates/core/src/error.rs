use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A status flag never reached the wanted state. On real hardware this is
    /// an endless spin; only a bounded [`crate::config::SlotConfig`] surfaces
    /// it. The cartridge has to be reinserted before anything else works.
    #[error("{what} did not settle after {polls} polls")]
    Stuck { what: &'static str, polls: u64 },

    #[error("{step} is not valid in state {state:?}")]
    OutOfOrder {
        step: &'static str,
        state: crate::ntr::unlock::NtrState,
    },

    #[error("KEY1 table is {0:#x} bytes, expected {expected:#x}", expected = crate::ntr::key1::KEY1_BYTES)]
    KeyTableSize(usize),

    #[error("header needs {need:#x} bytes, got {got:#x}")]
    HeaderTooShort { need: usize, got: usize },

    #[error("no cartridge in slot (chip id {0:#010x})")]
    NoCartridge(u32),

    #[error("operation needs a {expected} cartridge")]
    WrongProtocol { expected: &'static str },

    #[error("buffer of {got:#x} bytes is too small, need {need:#x}")]
    BufferTooSmall { need: usize, got: usize },
}
