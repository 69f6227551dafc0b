//! Stale-model flag
//!
//! Set whenever a requested change cannot be applied safely to running
//! instances or loaded compiled classes. Cumulative: reasons accumulate
//! until a full rebuild clears the flag.

use parking_lot::Mutex;

/// Stale-model state for one session
#[derive(Debug, Default)]
pub struct StaleModel {
    reasons: Mutex<Vec<String>>,
}

impl StaleModel {
    /// Create a clear flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the model stale; returns true if the reason is new
    pub fn mark(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut reasons = self.reasons.lock();
        if reasons.contains(&reason) {
            return false;
        }
        tracing::warn!(reason = %reason, "model is stale, recompile needed");
        reasons.push(reason);
        true
    }

    /// Check if a rebuild is required
    pub fn is_stale(&self) -> bool {
        !self.reasons.lock().is_empty()
    }

    /// Every recorded reason, oldest first
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }

    /// All reasons joined into one message
    pub fn reason(&self) -> Option<String> {
        let reasons = self.reasons.lock();
        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        }
    }

    /// Clear the flag after a full rebuild
    pub fn clear(&self) {
        self.reasons.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_reasons() {
        let stale = StaleModel::new();
        assert!(!stale.is_stale());
        assert_eq!(stale.reason(), None);

        assert!(stale.mark("base type changed"));
        assert!(!stale.mark("base type changed"));
        assert!(stale.mark("field removed"));

        assert!(stale.is_stale());
        assert_eq!(stale.reasons().len(), 2);
        assert_eq!(
            stale.reason().as_deref(),
            Some("base type changed; field removed")
        );

        stale.clear();
        assert!(!stale.is_stale());
    }
}
