//! Paired-channel preprocessing
//!
//! Acquisition devices report left/right readings that may be NaN when a
//! channel drops out. Before a sample enters a handler, invalid readings are
//! replaced by the most recent valid reading from either channel of the pair.

use crate::types::Sample;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Initial pair used until the first valid reading arrives
pub const DEFAULT_INITIAL_PAIR: (f64, f64) = (0.5, 0.5);

/// Outcome of fusing one raw pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedPair {
    pub left: f64,
    pub right: f64,
    /// True when both raw readings were invalid and the last pair was reused
    pub degraded: bool,
}

/// Repairs invalid readings of a left/right channel pair
#[derive(Debug, Clone)]
pub struct PairedChannelFuser {
    left_channel: String,
    right_channel: String,
    last_valid: (f64, f64),
    degraded_count: u64,
}

impl PairedChannelFuser {
    pub fn new(left_channel: impl Into<String>, right_channel: impl Into<String>) -> Self {
        Self::with_initial(left_channel, right_channel, DEFAULT_INITIAL_PAIR)
    }

    pub fn with_initial(
        left_channel: impl Into<String>,
        right_channel: impl Into<String>,
        initial: (f64, f64),
    ) -> Self {
        Self {
            left_channel: left_channel.into(),
            right_channel: right_channel.into(),
            last_valid: initial,
            degraded_count: 0,
        }
    }

    /// Fuse one raw reading pair.
    ///
    /// A single invalid channel copies the valid one; two invalid channels
    /// repeat the previous fused pair.
    pub fn fuse(&mut self, left: f64, right: f64) -> FusedPair {
        let degraded = match (left.is_finite(), right.is_finite()) {
            (true, true) => {
                self.last_valid = (left, right);
                false
            }
            (true, false) => {
                self.last_valid = (left, left);
                false
            }
            (false, true) => {
                self.last_valid = (right, right);
                false
            }
            (false, false) => {
                self.degraded_count += 1;
                debug!(
                    left = %self.left_channel,
                    right = %self.right_channel,
                    degraded = self.degraded_count,
                    "both channels invalid, reusing last pair"
                );
                true
            }
        };

        FusedPair {
            left: self.last_valid.0,
            right: self.last_valid.1,
            degraded,
        }
    }

    /// Fuse a raw pair into a two-channel sample
    pub fn fuse_sample(&mut self, left: f64, right: f64, timestamp: DateTime<Utc>) -> Sample {
        let pair = self.fuse(left, right);
        Sample::new(timestamp)
            .with(self.left_channel.clone(), pair.left)
            .with(self.right_channel.clone(), pair.right)
    }

    /// Last fused pair
    pub fn last_valid(&self) -> (f64, f64) {
        self.last_valid
    }

    /// Raw pairs where both readings were invalid
    pub fn degraded_count(&self) -> u64 {
        self.degraded_count
    }
}

/// Average of the valid readings of a pair.
///
/// Falls back to `previous` when both are invalid, or 0 without one.
pub fn fuse_mean(left: f64, right: f64, previous: Option<f64>) -> f64 {
    match (left.is_finite(), right.is_finite()) {
        (true, true) => (left + right) / 2.0,
        (true, false) => left,
        (false, true) => right,
        (false, false) => previous.unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::channels;

    fn make_fuser() -> PairedChannelFuser {
        PairedChannelFuser::new(channels::LEFT_PUPIL, channels::RIGHT_PUPIL)
    }

    #[test]
    fn test_valid_pair_passes_through() {
        let mut fuser = make_fuser();
        let pair = fuser.fuse(3.1, 3.3);
        assert_eq!((pair.left, pair.right), (3.1, 3.3));
        assert!(!pair.degraded);
    }

    #[test]
    fn test_single_invalid_channel_copies_other() {
        let mut fuser = make_fuser();
        let pair = fuser.fuse(f64::NAN, 3.3);
        assert_eq!((pair.left, pair.right), (3.3, 3.3));

        let pair = fuser.fuse(2.9, f64::NAN);
        assert_eq!((pair.left, pair.right), (2.9, 2.9));
    }

    #[test]
    fn test_both_invalid_reuses_last_pair() {
        let mut fuser = make_fuser();
        fuser.fuse(3.0, 3.2);
        let pair = fuser.fuse(f64::NAN, f64::NAN);
        assert_eq!((pair.left, pair.right), (3.0, 3.2));
        assert!(pair.degraded);
        assert_eq!(fuser.degraded_count(), 1);
    }

    #[test]
    fn test_initial_pair_before_any_valid_reading() {
        let mut fuser = make_fuser();
        let pair = fuser.fuse(f64::NAN, f64::NAN);
        assert_eq!((pair.left, pair.right), DEFAULT_INITIAL_PAIR);
    }

    #[test]
    fn test_fuse_sample_channels() {
        let mut fuser = make_fuser();
        let sample = fuser.fuse_sample(f64::NAN, 4.0, Utc::now());
        assert_eq!(sample.get(channels::LEFT_PUPIL), Some(4.0));
        assert_eq!(sample.get(channels::RIGHT_PUPIL), Some(4.0));
    }

    #[test]
    fn test_fuse_mean() {
        assert_eq!(fuse_mean(0.25, 0.75, None), 0.5);
        assert_eq!(fuse_mean(f64::NAN, 0.4, None), 0.4);
        assert_eq!(fuse_mean(f64::NAN, f64::NAN, Some(0.7)), 0.7);
        assert_eq!(fuse_mean(f64::NAN, f64::NAN, None), 0.0);
    }
}
