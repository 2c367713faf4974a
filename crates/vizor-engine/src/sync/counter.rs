/// CPU-side half of the completion counter.
///
/// Every submission claims the next value; the GPU reports the highest value it
/// has reached through [`crate::backend::Backend::completed_value`]. Values start
/// at 1 so that 0 means "nothing claimed yet".
#[derive(Debug, Default)]
pub struct CompletionCounter {
    issued: u64,
}

impl CompletionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the value for the next submission. Exactly one greater than the
    /// previous claim.
    pub fn claim(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Last value handed out by [`claim`](Self::claim).
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Number of claimed values the GPU has not reached yet.
    pub fn pending(&self, completed: u64) -> u64 {
        self.issued.saturating_sub(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_strictly_consecutive() {
        let mut counter = CompletionCounter::new();
        let values: Vec<u64> = (0..5).map(|_| counter.claim()).collect();
        assert_eq!(values, [1, 2, 3, 4, 5]);
        assert_eq!(counter.issued(), 5);
        assert_eq!(counter.pending(3), 2);
        assert_eq!(counter.pending(9), 0);
    }
}
