//! Ordering key for the chronological strategy.

use std::cmp::Ordering;

/// Decode start time of a track's next sample, as the exact ratio
/// `ticks / time_scale`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NextSample {
    ticks: u64,
    time_scale: u32,
    pub(crate) track: usize,
}

impl NextSample {
    pub(crate) fn new(track: usize, ticks: u64, time_scale: u32) -> Self {
        // Tracks without a usable time scale sort as time zero.
        if time_scale == 0 {
            Self {
                ticks: 0,
                time_scale: 1,
                track,
            }
        } else {
            Self {
                ticks,
                time_scale,
                track,
            }
        }
    }

    fn cmp_time(&self, other: &Self) -> Ordering {
        let lhs = self.ticks as u128 * other.time_scale as u128;
        let rhs = other.ticks as u128 * self.time_scale as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialEq for NextSample {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NextSample {}

impl PartialOrd for NextSample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NextSample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_time(other).then(self.track.cmp(&other.track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compares_across_time_scales() {
        // 1 second in both.
        let a = NextSample::new(1, 90000, 90000);
        let b = NextSample::new(0, 48000, 48000);
        assert!(b < a, "equal times break ties by track index");

        let earlier = NextSample::new(5, 959, 48000);
        let later = NextSample::new(0, 20, 1000);
        assert!(earlier < later);
    }

    #[test]
    fn test_zero_time_scale_sorts_first() {
        let unusable = NextSample::new(3, 1_000_000, 0);
        let zero = NextSample::new(4, 0, 1000);
        assert!(unusable < zero);
    }
}
