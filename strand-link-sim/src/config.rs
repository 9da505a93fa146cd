// ---------------------------------------------------------------------------
// LinkSimConfig
// ---------------------------------------------------------------------------

/// Impairments applied by a [`LinkSimStream`](crate::LinkSimStream) pair.
///
/// All fields default to a perfect link.
#[derive(Debug, Clone, Default)]
pub struct LinkSimConfig {
    // ---
    /// Probability `[0.0, 1.0]` that a flushed frame is silently dropped.
    pub drop_percent: f64,

    /// Probability `[0.0, 1.0]` that a flushed frame is delivered twice.
    pub dup_percent: f64,

    /// RNG seed for reproducible drop / dup sequences. `None` = random.
    pub seed: Option<u64>,
}

// ---

impl LinkSimConfig {
    // ---
    /// No impairments.
    pub fn perfect() -> Self {
        Self::default()
    }

    // ---

    /// Drop `drop_percent` of frames, reproducibly from `seed`.
    pub fn lossy(drop_percent: f64, seed: u64) -> Self {
        // ---
        Self {
            drop_percent,
            seed: Some(seed),
            ..Default::default()
        }
    }

    // ---

    pub(crate) fn is_perfect(&self) -> bool {
        self.drop_percent <= 0.0 && self.dup_percent <= 0.0
    }
}
