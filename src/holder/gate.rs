//! The received gate — a one-shot latch marking "at least one complete
//! batch of data has arrived".
//!
//! The gate starts [`Unset`](Gate::Unset) and moves exactly once to a
//! terminal state: [`Received`](Gate::Received) when the producer signals
//! the first complete batch, or [`Cancelled`](Gate::Cancelled) when the
//! owner gives up on ever receiving one. Terminal states never change;
//! repeated `data_received` calls re-notify batch listeners but leave the
//! gate as-is.

/// Lifecycle state of a holder's received gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    /// No complete batch has arrived yet; readers block.
    Unset,
    /// At least one complete batch has arrived; readers proceed.
    Received,
    /// Waiting was cancelled before any batch arrived; readers fail
    /// with a "wait cancelled" error.
    Cancelled,
}

impl Gate {
    /// Whether the gate has fired (first batch arrived).
    pub(crate) fn is_received(self) -> bool {
        matches!(self, Gate::Received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_states() {
        assert!(!Gate::Unset.is_received());
        assert!(Gate::Received.is_received());
        assert!(!Gate::Cancelled.is_received());
    }
}
