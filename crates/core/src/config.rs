pub struct SlotConfig {
    /// Upper bound on status register polls. `None` spins forever like the
    /// hardware does; `Some(n)` reports [`crate::error::Error::Stuck`] instead.
    pub spin_limit: Option<u64>,
    /// How often the first CTR challenge is resent after the handshake.
    pub ctr_settle_retries: u32,
    /// Delay between those resends, in ARM9 cycles.
    pub ctr_retry_delay: u32,
    /// Delay after the AES session before the seed is programmed.
    pub ctr_aes_delay: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            spin_limit: None,
            ctr_settle_retries: 5,
            ctr_retry_delay: 0xF0000,
            ctr_aes_delay: 0xF0000,
        }
    }
}
