//! Responsible-predictor selection.
//!
//! Each object-bearing cell owns several candidate predictors, but only
//! one of them is trained against the ground truth. The selection prefers
//! the highest IoU once any candidate overlaps the truth at all, and
//! falls back to the lowest coordinate RMSE while every candidate seen so
//! far has zero overlap. Two overrides can replace the scan entirely: a
//! size-based forced split between the first two predictors, and a
//! uniformly random pick during early-training warm-up.

use crate::geometry::BBox;
use rand::rngs::StdRng;
use rand::Rng;

/// Training step count below which the random override applies.
pub const WARMUP_STEPS: usize = 64_000;

/// Normalized-area threshold separating "small" objects for the forced
/// override.
pub const SMALL_OBJECT_AREA: f32 = 0.1;

/// Initial running-best RMSE; any realistic candidate beats it.
const RMSE_SENTINEL: f32 = 20.0;

/// Selects which predictor in a cell is responsible for its object.
///
/// # Example
///
/// ```
/// use detectar::{BBox, PredictorMatcher};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let matcher = PredictorMatcher::new(false, false);
/// let mut rng = StdRng::seed_from_u64(0);
/// let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
/// let candidates = [
///     BBox::new(0.9, 0.9, 0.05, 0.05), // disjoint
///     BBox::new(0.5, 0.5, 0.2, 0.2),   // perfect overlap
/// ];
/// assert_eq!(matcher.select(Some(&truth), &candidates, 0, &mut rng), Some(1));
/// assert_eq!(matcher.select(None, &candidates, 0, &mut rng), None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictorMatcher {
    forced: bool,
    random: bool,
}

impl PredictorMatcher {
    /// Create a matcher with the given override policies.
    #[must_use]
    pub fn new(forced: bool, random: bool) -> Self {
        Self { forced, random }
    }

    /// Whether the size-based forced override is enabled.
    #[must_use]
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Whether the random warm-up override is enabled.
    #[must_use]
    pub fn random(&self) -> bool {
        self.random
    }

    /// Return the responsible predictor index, or `None` for a cell
    /// without an object.
    ///
    /// `truth` and `candidates` must already share a coordinate frame
    /// (cell centers divided by the grid side, extents de-square-rooted
    /// when that encoding is active). `seen` is the global training step
    /// count driving the warm-up override.
    pub fn select(
        &self,
        truth: Option<&BBox>,
        candidates: &[BBox],
        seen: usize,
        rng: &mut StdRng,
    ) -> Option<usize> {
        let truth = truth?;

        let mut best: Option<usize> = None;
        let mut best_iou = 0.0f32;
        let mut best_rmse = RMSE_SENTINEL;

        for (index, candidate) in candidates.iter().enumerate() {
            let iou = candidate.iou(truth);
            // Once any candidate overlaps, comparison is by IoU only for
            // the rest of the scan; the RMSE fallback is never revisited.
            if best_iou > 0.0 || iou > 0.0 {
                if iou > best_iou {
                    best_iou = iou;
                    best = Some(index);
                }
            } else {
                let rmse = candidate.rmse(truth);
                if rmse < best_rmse {
                    best_rmse = rmse;
                    best = Some(index);
                }
            }
        }

        // Inconclusive only when every candidate is disjoint and at least
        // RMSE_SENTINEL away; settle on the first predictor.
        let mut best = best.unwrap_or(0);

        if self.forced {
            best = usize::from(truth.area() < SMALL_OBJECT_AREA);
        }
        if self.random && seen < WARMUP_STEPS {
            best = rng.gen_range(0..candidates.len());
        }

        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_no_object_is_none() {
        let matcher = PredictorMatcher::new(false, false);
        let candidates = [BBox::new(0.5, 0.5, 0.2, 0.2)];
        assert_eq!(matcher.select(None, &candidates, 0, &mut rng()), None);
    }

    #[test]
    fn test_single_overlapping_candidate_wins() {
        let matcher = PredictorMatcher::new(false, false);
        let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
        let candidates = [
            BBox::new(2.0, 2.0, 0.2, 0.2),
            BBox::new(0.55, 0.5, 0.2, 0.2),
            BBox::new(3.0, 3.0, 0.2, 0.2),
        ];
        assert_eq!(
            matcher.select(Some(&truth), &candidates, 0, &mut rng()),
            Some(1)
        );
    }

    #[test]
    fn test_highest_iou_wins() {
        let matcher = PredictorMatcher::new(false, false);
        let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
        let candidates = [
            BBox::new(0.6, 0.5, 0.2, 0.2),
            BBox::new(0.5, 0.5, 0.2, 0.2),
            BBox::new(0.55, 0.5, 0.2, 0.2),
        ];
        assert_eq!(
            matcher.select(Some(&truth), &candidates, 0, &mut rng()),
            Some(1)
        );
    }

    #[test]
    fn test_all_disjoint_lowest_rmse_wins() {
        let matcher = PredictorMatcher::new(false, false);
        let truth = BBox::new(0.5, 0.5, 0.1, 0.1);
        let candidates = [
            BBox::new(5.0, 5.0, 0.1, 0.1),
            BBox::new(1.0, 1.0, 0.1, 0.1),
            BBox::new(3.0, 3.0, 0.1, 0.1),
        ];
        assert_eq!(
            matcher.select(Some(&truth), &candidates, 0, &mut rng()),
            Some(1)
        );
    }

    #[test]
    fn test_overlap_beats_closer_disjoint_candidate() {
        // A disjoint candidate after an overlapping one is never
        // reconsidered by RMSE, however close its coordinates are.
        let matcher = PredictorMatcher::new(false, false);
        let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
        let candidates = [
            BBox::new(0.5, 0.5, 1.9, 1.9),  // overlaps, wildly oversized
            BBox::new(0.5, 0.75, 0.2, 0.2), // disjoint but much closer
        ];
        assert!(candidates[0].iou(&truth) > 0.0);
        assert_eq!(candidates[1].iou(&truth), 0.0);
        assert!(candidates[1].rmse(&truth) < candidates[0].rmse(&truth));
        assert_eq!(
            matcher.select(Some(&truth), &candidates, 0, &mut rng()),
            Some(0)
        );
    }

    #[test]
    fn test_forced_splits_by_area() {
        let matcher = PredictorMatcher::new(true, false);
        let candidates = [
            BBox::new(0.0, 0.0, 1.0, 1.0),
            BBox::new(0.0, 0.0, 1.0, 1.0),
        ];
        let large = BBox::new(0.5, 0.5, 0.5, 0.5); // area 0.25
        let small = BBox::new(0.5, 0.5, 0.2, 0.2); // area 0.04
        assert_eq!(
            matcher.select(Some(&large), &candidates, 0, &mut rng()),
            Some(0)
        );
        assert_eq!(
            matcher.select(Some(&small), &candidates, 0, &mut rng()),
            Some(1)
        );
    }

    #[test]
    fn test_forced_boundary_area_selects_first() {
        // Exactly at the threshold counts as large.
        let matcher = PredictorMatcher::new(true, false);
        let candidates = [BBox::new(0.0, 0.0, 1.0, 1.0); 2];
        let truth = BBox::new(0.5, 0.5, 0.5, 0.2); // area 0.1
        assert_eq!(
            matcher.select(Some(&truth), &candidates, 0, &mut rng()),
            Some(0)
        );
    }

    #[test]
    fn test_random_override_during_warmup() {
        let matcher = PredictorMatcher::new(false, true);
        let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
        // Candidate 0 is the clear winner; the warm-up pick ignores it.
        let candidates = [
            BBox::new(0.5, 0.5, 0.2, 0.2),
            BBox::new(5.0, 5.0, 0.2, 0.2),
            BBox::new(6.0, 6.0, 0.2, 0.2),
        ];
        let mut rng = rng();
        let mut picked = [false; 3];
        for _ in 0..64 {
            let index = matcher
                .select(Some(&truth), &candidates, 0, &mut rng)
                .unwrap();
            picked[index] = true;
        }
        assert!(picked.iter().all(|&p| p), "warm-up should reach every index");
    }

    #[test]
    fn test_random_override_expires_after_warmup() {
        let matcher = PredictorMatcher::new(false, true);
        let truth = BBox::new(0.5, 0.5, 0.2, 0.2);
        let candidates = [
            BBox::new(0.5, 0.5, 0.2, 0.2),
            BBox::new(5.0, 5.0, 0.2, 0.2),
        ];
        let mut rng = rng();
        for _ in 0..16 {
            assert_eq!(
                matcher.select(Some(&truth), &candidates, WARMUP_STEPS, &mut rng),
                Some(0)
            );
        }
    }
}
