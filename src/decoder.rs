//! Inference-time decoding of the prediction tensor.
//!
//! No matching and no gradients: every (cell, predictor) pair becomes one
//! [`Detection`] with an absolute image-space box, the raw objectness
//! score, and thresholded per-class probabilities.

use crate::geometry::BBox;
use crate::layout::GridLayout;
use serde::{Deserialize, Serialize};

/// One decoded predictor: image-space box, raw objectness, and a
/// `classes`-length probability vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in pixel units.
    pub bbox: BBox,
    /// Raw predicted objectness score.
    pub objectness: f32,
    /// Per-class probability, `objectness * class score`, zeroed at or
    /// below the threshold.
    pub prob: Vec<f32>,
}

/// Decode the prediction tensor of one image into `side² * num`
/// detections.
///
/// Class probabilities survive only when strictly greater than `thresh`;
/// a probability exactly equal to the threshold is zeroed. With
/// `only_objectness`, the first class slot is overwritten by the raw
/// objectness score for callers that want a single presence value.
///
/// # Panics
///
/// Panics if `predictions` is shorter than the layout's per-image length.
#[must_use]
pub fn decode(
    predictions: &[f32],
    layout: GridLayout,
    sqrt: bool,
    width: usize,
    height: usize,
    thresh: f32,
    only_objectness: bool,
) -> Vec<Detection> {
    assert!(
        predictions.len() >= layout.inputs(),
        "prediction tensor shorter than layout ({} < {})",
        predictions.len(),
        layout.inputs()
    );

    let side = layout.side();
    let classes = layout.classes();
    let exponent = if sqrt { 2 } else { 1 };
    let mut detections = Vec::with_capacity(layout.cells() * layout.num());

    for cell in 0..layout.cells() {
        let row = cell / side;
        let col = cell % side;
        for pred in 0..layout.num() {
            let objectness = predictions[layout.objectness_offset(0, cell, pred)];
            let box_base = layout.box_offset(0, cell, pred);

            let bbox = BBox {
                x: (predictions[box_base] + col as f32) / side as f32 * width as f32,
                y: (predictions[box_base + 1] + row as f32) / side as f32 * height as f32,
                w: predictions[box_base + 2].powi(exponent) * width as f32,
                h: predictions[box_base + 3].powi(exponent) * height as f32,
            };

            let class_base = layout.class_offset(0, cell);
            let mut prob: Vec<f32> = (0..classes)
                .map(|c| {
                    let p = objectness * predictions[class_base + c];
                    if p > thresh {
                        p
                    } else {
                        0.0
                    }
                })
                .collect();
            if only_objectness {
                prob[0] = objectness;
            }

            detections.push(Detection {
                bbox,
                objectness,
                prob,
            });
        }
    }

    detections
}
