//! The detection layer: configuration, buffer lifecycle, and the
//! forward/backward entry points the hosting network calls.

use crate::decoder::{self, Detection};
use crate::error::{DetectarError, Result};
use crate::layout::GridLayout;
use crate::loss::{self, DetectionStats};
use crate::matcher::PredictorMatcher;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Configuration for a [`DetectionLayer`].
///
/// The default is the classic 7×7 grid with 2 predictors per cell and
/// 20 classes. Dataset-specific weighting (e.g. a heavier coordinate
/// scale) is applied through the builder methods:
///
/// ```
/// use detectar::DetectionConfig;
///
/// let config = DetectionConfig::default()
///     .with_coord_scale(5.0)
///     .with_rescore(true)
///     .with_seed(7);
/// assert_eq!(config.inputs, 7 * 7 * 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Images per batch.
    pub batch: usize,
    /// Prediction tensor length per image; must equal
    /// `side² * ((1 + coords) * num + classes)`.
    pub inputs: usize,
    /// Predictors per cell.
    pub num: usize,
    /// Grid side length.
    pub side: usize,
    /// Class count.
    pub classes: usize,
    /// Box coordinate count; the box codec requires 4.
    pub coords: usize,
    /// Train matched objectness toward measured IoU instead of 1.
    pub rescore: bool,
    /// Box extents are stored as square roots.
    pub sqrt: bool,
    /// Forced predictor split by object size.
    pub forced: bool,
    /// Random predictor pick during warm-up.
    pub random: bool,
    /// Apply a softmax over each cell's class block on forward.
    pub softmax: bool,
    /// Weight of the no-object objectness term.
    pub noobject_scale: f32,
    /// Weight of the matched objectness term.
    pub object_scale: f32,
    /// Weight of the classification term.
    pub class_scale: f32,
    /// Weight of the coordinate term.
    pub coord_scale: f32,
    /// RNG seed for the random override; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Emit the diagnostics line on every training forward.
    pub verbose: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            batch: 1,
            inputs: 7 * 7 * ((1 + 4) * 2 + 20),
            num: 2,
            side: 7,
            classes: 20,
            coords: 4,
            rescore: false,
            sqrt: false,
            forced: false,
            random: false,
            softmax: false,
            noobject_scale: 0.5,
            object_scale: 1.0,
            class_scale: 1.0,
            coord_scale: 1.0,
            seed: None,
            verbose: false,
        }
    }
}

impl DetectionConfig {
    /// Set the grid dimensions and recompute `inputs` to match.
    #[must_use]
    pub fn with_grid(mut self, side: usize, num: usize, classes: usize) -> Self {
        self.side = side;
        self.num = num;
        self.classes = classes;
        self.inputs = GridLayout::new(side, num, classes, self.coords).inputs();
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Enable IoU rescoring of the matched objectness target.
    #[must_use]
    pub fn with_rescore(mut self, rescore: bool) -> Self {
        self.rescore = rescore;
        self
    }

    /// Enable square-root extent encoding.
    #[must_use]
    pub fn with_sqrt(mut self, sqrt: bool) -> Self {
        self.sqrt = sqrt;
        self
    }

    /// Enable the size-based forced predictor split.
    #[must_use]
    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    /// Enable the random warm-up predictor pick.
    #[must_use]
    pub fn with_random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    /// Enable the class-block softmax on forward.
    #[must_use]
    pub fn with_softmax(mut self, softmax: bool) -> Self {
        self.softmax = softmax;
        self
    }

    /// Set all four loss weights at once.
    #[must_use]
    pub fn with_scales(mut self, noobject: f32, object: f32, class: f32, coord: f32) -> Self {
        self.noobject_scale = noobject;
        self.object_scale = object;
        self.class_scale = class;
        self.coord_scale = coord;
        self
    }

    /// Set the coordinate loss weight.
    #[must_use]
    pub fn with_coord_scale(mut self, coord_scale: f32) -> Self {
        self.coord_scale = coord_scale;
        self
    }

    /// Set the RNG seed for reproducible warm-up picks.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Emit the diagnostics line on every training forward.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Output stage of a single-shot grid detector.
///
/// Owns its output and delta tensors (`batch * inputs` each), allocated
/// once at construction and reused across calls; the delta tensor is
/// zeroed and fully rewritten on every training forward. The ground
/// truth tensor stays caller-owned and read-only.
///
/// # Example
///
/// ```
/// use detectar::{DetectionConfig, DetectionLayer};
///
/// let config = DetectionConfig::default().with_grid(2, 1, 1);
/// let mut layer = DetectionLayer::new(config).unwrap();
///
/// // One object in cell 0, matching prediction: tiny residual loss.
/// let mut input = vec![0.0f32; 24];
/// input[0] = 0.9; // class score
/// input[4] = 0.9; // objectness
/// input[8..12].copy_from_slice(&[0.5, 0.5, 0.4, 0.4]);
/// let mut truth = vec![0.0f32; 24];
/// truth[0] = 1.0; // presence
/// truth[1] = 1.0; // class 0
/// truth[2..6].copy_from_slice(&[0.5, 0.5, 0.4, 0.4]);
///
/// let stats = layer.forward(&input, Some(&truth), true, 0).unwrap();
/// assert_eq!(stats.count, 1);
/// assert!((stats.avg_iou - 1.0).abs() < 1e-5);
/// assert!((layer.cost() - 0.02).abs() < 1e-5);
/// ```
#[derive(Debug)]
pub struct DetectionLayer {
    config: DetectionConfig,
    layout: GridLayout,
    matcher: PredictorMatcher,
    rng: StdRng,
    output: Vec<f32>,
    delta: Vec<f32>,
    cost: f32,
}

impl DetectionLayer {
    /// Build a layer, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DetectarError::InvalidHyperparameter`] when a dimension
    /// is zero or `coords != 4`, and [`DetectarError::DimensionMismatch`]
    /// when `inputs` does not match the grid layout identity.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        for (param, value) in [
            ("batch", config.batch),
            ("side", config.side),
            ("num", config.num),
            ("classes", config.classes),
        ] {
            if value == 0 {
                return Err(DetectarError::InvalidHyperparameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    constraint: ">0".to_string(),
                });
            }
        }
        if config.coords != 4 {
            return Err(DetectarError::InvalidHyperparameter {
                param: "coords".to_string(),
                value: config.coords.to_string(),
                constraint: "4".to_string(),
            });
        }
        // The forced override splits objects between the first two
        // predictors, so it needs at least two to split between.
        if config.forced && config.num < 2 {
            return Err(DetectarError::InvalidHyperparameter {
                param: "num".to_string(),
                value: config.num.to_string(),
                constraint: ">=2 when forced".to_string(),
            });
        }

        let layout = GridLayout::new(config.side, config.num, config.classes, config.coords);
        if config.inputs != layout.inputs() {
            return Err(DetectarError::DimensionMismatch {
                expected: layout.inputs().to_string(),
                actual: config.inputs.to_string(),
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let size = config.batch * config.inputs;
        let matcher = PredictorMatcher::new(config.forced, config.random);

        Ok(Self {
            config,
            layout,
            matcher,
            rng,
            output: vec![0.0; size],
            delta: vec![0.0; size],
            cost: 0.0,
        })
    }

    /// Run the layer forward.
    ///
    /// Copies `input` into the output tensor (softmaxing each cell's
    /// class block when configured), then, when `train` is set and a
    /// ground-truth tensor is present, rewrites the delta tensor and the
    /// cost and returns the batch diagnostics. Inference calls and
    /// truthless training calls return `None`.
    ///
    /// `seen` is the global training step count; it only drives the
    /// random warm-up override.
    ///
    /// # Panics
    ///
    /// Panics if `input` is not `batch * inputs` long, or if the ground
    /// truth is not `batch * side² * (1 + coords + classes)` long.
    pub fn forward(
        &mut self,
        input: &[f32],
        truth: Option<&[f32]>,
        train: bool,
        seen: usize,
    ) -> Option<DetectionStats> {
        assert_eq!(
            input.len(),
            self.output.len(),
            "input tensor must be batch * inputs long"
        );
        self.output.copy_from_slice(input);

        if self.config.softmax {
            for b in 0..self.config.batch {
                for cell in 0..self.layout.cells() {
                    let base = self.layout.class_offset(b, cell);
                    softmax_in_place(&mut self.output[base..base + self.config.classes]);
                }
            }
        }

        let truth = match truth {
            Some(t) if train => t,
            _ => return None,
        };
        assert_eq!(
            truth.len(),
            self.layout.truth_len(self.config.batch),
            "ground truth tensor must be batch * cells * truth_stride long"
        );

        let (cost, stats) = loss::accumulate(
            &self.output,
            truth,
            &mut self.delta,
            &self.config,
            self.layout,
            self.matcher,
            seen,
            &mut self.rng,
        );
        self.cost = cost;
        if self.config.verbose {
            eprintln!("{stats}");
        }
        Some(stats)
    }

    /// Add this layer's gradient into the upstream delta buffer.
    ///
    /// # Panics
    ///
    /// Panics if `upstream` is not `batch * inputs` long.
    pub fn backward(&self, upstream: &mut [f32]) {
        assert_eq!(
            upstream.len(),
            self.delta.len(),
            "upstream delta must be batch * inputs long"
        );
        for (u, d) in upstream.iter_mut().zip(&self.delta) {
            *u += d;
        }
    }

    /// Decode one image of the current output tensor into detections.
    ///
    /// # Panics
    ///
    /// Panics if `image` is outside the batch.
    #[must_use]
    pub fn detections(
        &self,
        image: usize,
        width: usize,
        height: usize,
        thresh: f32,
        only_objectness: bool,
    ) -> Vec<Detection> {
        assert!(image < self.config.batch, "image index outside the batch");
        let start = image * self.config.inputs;
        decoder::decode(
            &self.output[start..start + self.config.inputs],
            self.layout,
            self.config.sqrt,
            width,
            height,
            thresh,
            only_objectness,
        )
    }

    /// Cost of the most recent training forward.
    #[must_use]
    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Gradient tensor of the most recent training forward.
    #[must_use]
    pub fn delta(&self) -> &[f32] {
        &self.delta
    }

    /// Output tensor of the most recent forward.
    #[must_use]
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    /// Layer configuration.
    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Grid addressing shared by the training and inference paths.
    #[must_use]
    pub fn layout(&self) -> GridLayout {
        self.layout
    }
}

/// Numerically stable in-place softmax.
fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> DetectionConfig {
        DetectionConfig::default().with_grid(2, 1, 1).with_seed(0)
    }

    #[test]
    fn test_construction_validates_inputs_identity() {
        let mut config = tiny_config();
        config.inputs = 23;
        let err = DetectionLayer::new(config).unwrap_err();
        assert!(matches!(err, DetectarError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_construction_rejects_zero_side() {
        let mut config = tiny_config();
        config.side = 0;
        let err = DetectionLayer::new(config).unwrap_err();
        assert!(matches!(err, DetectarError::InvalidHyperparameter { .. }));
    }

    #[test]
    fn test_construction_rejects_forced_single_predictor() {
        let mut config = tiny_config();
        config.forced = true;
        let err = DetectionLayer::new(config).unwrap_err();
        assert!(matches!(err, DetectarError::InvalidHyperparameter { .. }));
    }

    #[test]
    fn test_construction_rejects_non_quad_coords() {
        let mut config = tiny_config();
        config.coords = 5;
        let err = DetectionLayer::new(config).unwrap_err();
        assert!(matches!(err, DetectarError::InvalidHyperparameter { .. }));
    }

    #[test]
    fn test_default_config_constructs() {
        let layer = DetectionLayer::new(DetectionConfig::default()).unwrap();
        assert_eq!(layer.output().len(), 7 * 7 * 30);
    }

    #[test]
    fn test_inference_forward_copies_input() {
        let mut layer = DetectionLayer::new(tiny_config()).unwrap();
        let input: Vec<f32> = (0..24).map(|i| i as f32 * 0.01).collect();
        assert!(layer.forward(&input, None, false, 0).is_none());
        assert_eq!(layer.output(), input.as_slice());
    }

    #[test]
    fn test_train_without_truth_skips_loss() {
        let mut layer = DetectionLayer::new(tiny_config()).unwrap();
        let input = vec![0.25; 24];
        assert!(layer.forward(&input, None, true, 0).is_none());
        assert_eq!(layer.cost(), 0.0);
    }

    #[test]
    fn test_softmax_normalizes_class_blocks() {
        let config = DetectionConfig::default()
            .with_grid(1, 1, 3)
            .with_softmax(true);
        let mut layer = DetectionLayer::new(config).unwrap();
        let input = vec![1.0, 2.0, 3.0, 0.5, 0.1, 0.2, 0.3, 0.4];
        layer.forward(&input, None, false, 0);
        let classes = &layer.output()[..3];
        let sum: f32 = classes.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(classes[2] > classes[1] && classes[1] > classes[0]);
        // Blocks past the classes are untouched.
        assert_eq!(&layer.output()[3..], &input[3..]);
    }

    #[test]
    fn test_backward_accumulates_delta() {
        let mut layer = DetectionLayer::new(tiny_config()).unwrap();
        let mut input = vec![0.0f32; 24];
        input[4] = 0.8;
        let truth = vec![0.0f32; 24];
        layer.forward(&input, Some(&truth), true, 0);

        let mut upstream = vec![1.0f32; 24];
        layer.backward(&mut upstream);
        // noobject term: 0.5 * (0 - 0.8) = -0.4, added onto 1.0.
        assert!((upstream[4] - 0.6).abs() < 1e-6);
        assert_eq!(upstream[0], 1.0);
    }

    #[test]
    fn test_delta_is_rewritten_each_pass() {
        let mut layer = DetectionLayer::new(tiny_config()).unwrap();
        let mut input = vec![0.0f32; 24];
        input[4] = 0.8;
        let truth = vec![0.0f32; 24];
        layer.forward(&input, Some(&truth), true, 0);
        let first = layer.delta().to_vec();

        // A second pass over zero predictions must not retain old terms.
        let zeros = vec![0.0f32; 24];
        layer.forward(&zeros, Some(&truth), true, 0);
        assert!(layer.delta().iter().all(|&d| d == 0.0));
        assert!(first.iter().any(|&d| d != 0.0));
    }

    #[test]
    fn test_config_builder_recomputes_inputs() {
        let config = DetectionConfig::default().with_grid(4, 3, 10);
        assert_eq!(config.inputs, 16 * (5 * 3 + 10));
        assert!(DetectionLayer::new(config).is_ok());
    }
}
