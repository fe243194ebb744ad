// SPDX-License-Identifier: GPL-3.0-only

//! Duplicate decode suppression

use crate::code::CodeFormat;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeats of recently seen values
///
/// Every `(content, format)` pair keeps its own last-seen time. A value is
/// dropped while it keeps showing up less than `window` apart, and every
/// sighting, emitted or not, restarts its window. Several codes held in view
/// together are therefore each saved once, and a code is saved again only
/// after it has been out of view for a full window.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    seen: HashMap<(String, CodeFormat), Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a sighting and report whether it should be emitted
    pub fn accept(&mut self, content: &str, format: &CodeFormat, now: Instant) -> bool {
        self.prune(now);
        let key = (content.to_string(), format.clone());
        let emit = !self.seen.contains_key(&key);
        self.seen.insert(key, now);
        emit
    }

    /// Refresh a value that is still inside its window
    ///
    /// Returns `true` when the value was being suppressed. Unknown or expired
    /// values are left untracked so a later [`accept`](Self::accept) emits them.
    pub fn touch(&mut self, content: &str, format: &CodeFormat, now: Instant) -> bool {
        self.prune(now);
        match self.seen.get_mut(&(content.to_string(), format.clone())) {
            Some(at) => {
                *at = now;
                true
            }
            None => false,
        }
    }

    /// Number of values currently suppressed
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    /// Forget every value, e.g. when the scan screen is left
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    #[test]
    fn test_repeat_inside_window_is_suppressed() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        assert!(!debouncer.accept("ABC", &CodeFormat::Qr, t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_continuous_sightings_keep_suppressing() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        for step in 1..10 {
            let now = t0 + Duration::from_millis(300 * step);
            assert!(!debouncer.accept("ABC", &CodeFormat::Qr, now));
        }
    }

    #[test]
    fn test_repeat_after_gap_is_emitted() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0 + WINDOW));
    }

    #[test]
    fn test_alternating_values_are_each_suppressed() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        assert!(debouncer.accept("5901234123457", &CodeFormat::Ean13, t0));
        for step in 1..10 {
            let now = t0 + Duration::from_millis(100 * step);
            assert!(!debouncer.accept("ABC", &CodeFormat::Qr, now));
            assert!(!debouncer.accept("5901234123457", &CodeFormat::Ean13, now));
        }
        // Same text in another symbology is a different value
        assert!(debouncer.accept("ABC", &CodeFormat::Ean13, t0 + WINDOW));
    }

    #[test]
    fn test_expired_values_are_pruned() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        debouncer.accept("A", &CodeFormat::Qr, t0);
        debouncer.accept("B", &CodeFormat::Qr, t0);
        assert_eq!(debouncer.tracked(), 2);

        assert!(debouncer.accept("C", &CodeFormat::Qr, t0 + WINDOW));
        assert_eq!(debouncer.tracked(), 1);
    }

    #[test]
    fn test_touch_refreshes_only_tracked_values() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(!debouncer.touch("ABC", &CodeFormat::Qr, t0));
        assert_eq!(debouncer.tracked(), 0);

        debouncer.accept("ABC", &CodeFormat::Qr, t0);
        assert!(debouncer.touch("ABC", &CodeFormat::Qr, t0 + Duration::from_millis(400)));
        // The touch restarted the window
        assert!(!debouncer.accept("ABC", &CodeFormat::Qr, t0 + Duration::from_millis(800)));
    }

    #[test]
    fn test_reset_forgets_all_values() {
        let mut debouncer = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        assert!(debouncer.accept("XYZ", &CodeFormat::Qr, t0));
        debouncer.reset();
        assert!(debouncer.accept("ABC", &CodeFormat::Qr, t0));
        assert!(debouncer.accept("XYZ", &CodeFormat::Qr, t0));
    }
}
