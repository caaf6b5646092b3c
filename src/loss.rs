//! Training-time loss and gradient accumulation.
//!
//! Walks every (image, cell) pair, matches one responsible predictor per
//! object, and writes the weighted gradient terms back into the delta
//! tensor in the exact layout the predictions were read from. The scalar
//! cost is the squared magnitude of the finished delta tensor.

use crate::geometry::BBox;
use crate::layer::DetectionConfig;
use crate::layout::GridLayout;
use crate::matcher::PredictorMatcher;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Running diagnostic averages over one training forward pass.
///
/// All `avg_*` fields except [`avg_any_object`](Self::avg_any_object) are
/// averaged over the object-bearing cell count; the division is
/// unguarded, so a batch containing no objects yields NaN for them.
/// Callers that may see empty batches should check
/// [`count`](Self::count) first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Mean IoU between matched predictors and their ground truth.
    pub avg_iou: f32,
    /// Mean predicted score of the true class in object cells.
    pub avg_true_class: f32,
    /// Mean predicted score over all classes in object cells.
    pub avg_all_class: f32,
    /// Mean objectness of matched predictors.
    pub avg_object: f32,
    /// Mean objectness over every predictor in the batch.
    pub avg_any_object: f32,
    /// Number of object-bearing cells seen.
    pub count: usize,
}

impl fmt::Display for DetectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection Avg IOU: {:.6}, Pos Cat: {:.6}, All Cat: {:.6}, Pos Obj: {:.6}, Any Obj: {:.6}, count: {}",
            self.avg_iou,
            self.avg_true_class,
            self.avg_all_class,
            self.avg_object,
            self.avg_any_object,
            self.count
        )
    }
}

/// Read one predictor's box and align it with the ground-truth frame:
/// centers divided by the grid side, extents squared when they are stored
/// as square roots.
pub(crate) fn decode_candidate(output: &[f32], offset: usize, side: usize, sqrt: bool) -> BBox {
    let mut b = BBox::from_slice(&output[offset..offset + 4]);
    b.x /= side as f32;
    b.y /= side as f32;
    if sqrt {
        b.w *= b.w;
        b.h *= b.h;
    }
    b
}

/// Zero `delta`, rewrite it term by term, and return the scalar cost with
/// the batch diagnostics. `output` and `truth` are read-only; `delta`
/// must have the same length as `output`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate(
    output: &[f32],
    truth: &[f32],
    delta: &mut [f32],
    config: &DetectionConfig,
    layout: GridLayout,
    matcher: PredictorMatcher,
    seen: usize,
    rng: &mut StdRng,
) -> (f32, DetectionStats) {
    let cells = layout.cells();
    let num = layout.num();
    let classes = layout.classes();
    let coords = layout.coords();
    let side = layout.side();

    let mut avg_iou = 0.0f32;
    let mut avg_true_class = 0.0f32;
    let mut avg_all_class = 0.0f32;
    let mut avg_object = 0.0f32;
    let mut avg_any_object = 0.0f32;
    let mut count = 0usize;

    delta.fill(0.0);
    let mut candidates: Vec<BBox> = Vec::with_capacity(num);

    for b in 0..config.batch {
        for cell in 0..cells {
            let truth_base = layout.truth_offset(b, cell);
            let is_obj = truth[truth_base] != 0.0;

            // Baseline: pull every predictor's objectness toward zero.
            // The matched predictor's entry is overwritten below.
            for pred in 0..num {
                let p = layout.objectness_offset(b, cell, pred);
                delta[p] = config.noobject_scale * (0.0 - output[p]);
                avg_any_object += output[p];
            }

            if !is_obj {
                continue;
            }

            let class_base = layout.class_offset(b, cell);
            for c in 0..classes {
                let flag = truth[truth_base + 1 + c];
                delta[class_base + c] = config.class_scale * (flag - output[class_base + c]);
                if flag != 0.0 {
                    avg_true_class += output[class_base + c];
                }
                avg_all_class += output[class_base + c];
            }

            let mut truth_box = BBox::from_slice(&truth[truth_base + 1 + classes..]);
            truth_box.x /= side as f32;
            truth_box.y /= side as f32;

            candidates.clear();
            for pred in 0..num {
                let offset = layout.box_offset(b, cell, pred);
                candidates.push(decode_candidate(output, offset, side, config.sqrt));
            }

            let best = matcher
                .select(Some(&truth_box), &candidates, seen, rng)
                .expect("object cell always matches a predictor");
            let iou = candidates[best].iou(&truth_box);

            let p = layout.objectness_offset(b, cell, best);
            avg_object += output[p];
            delta[p] = if config.rescore {
                config.object_scale * (iou - output[p])
            } else {
                config.object_scale * (1.0 - output[p])
            };

            let box_base = layout.box_offset(b, cell, best);
            let truth_coords = truth_base + 1 + classes;
            for k in 0..coords {
                delta[box_base + k] =
                    config.coord_scale * (truth[truth_coords + k] - output[box_base + k]);
            }
            if config.sqrt {
                delta[box_base + 2] =
                    config.coord_scale * (truth[truth_coords + 2].sqrt() - output[box_base + 2]);
                delta[box_base + 3] =
                    config.coord_scale * (truth[truth_coords + 3].sqrt() - output[box_base + 3]);
            }

            avg_iou += iou;
            count += 1;
        }
    }

    let cost = delta.iter().map(|d| d * d).sum();

    let n = count as f32;
    let stats = DetectionStats {
        avg_iou: avg_iou / n,
        avg_true_class: avg_true_class / n,
        avg_all_class: avg_all_class / (n * classes as f32),
        avg_object: avg_object / n,
        avg_any_object: avg_any_object / (config.batch * cells * num) as f32,
        count,
    };

    (cost, stats)
}
