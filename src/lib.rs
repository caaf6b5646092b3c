//! Detectar: output stage for single-shot grid-based object detectors.
//!
//! The layer consumes a flat prediction tensor from an upstream feature
//! network plus a flat ground-truth tensor, and either computes a
//! multi-term loss with its gradient tensor (training) or decodes
//! image-space bounding boxes with per-class scores (inference). Both
//! paths share one addressing scheme so they cannot drift apart.
//!
//! # Quick Start
//!
//! ```
//! use detectar::{DetectionConfig, DetectionLayer};
//!
//! // A 2x2 grid with one predictor and one class per cell.
//! let config = DetectionConfig::default().with_grid(2, 1, 1);
//! let mut layer = DetectionLayer::new(config).unwrap();
//!
//! // Train against one object whose center falls in cell 0.
//! let mut predictions = vec![0.0f32; 24];
//! predictions[0] = 0.9; // class score
//! predictions[4] = 0.9; // objectness
//! predictions[8..12].copy_from_slice(&[0.5, 0.5, 0.4, 0.4]);
//! let mut truth = vec![0.0f32; 24];
//! truth[0] = 1.0; // presence flag
//! truth[1] = 1.0; // class 0
//! truth[2..6].copy_from_slice(&[0.5, 0.5, 0.4, 0.4]);
//!
//! let stats = layer.forward(&predictions, Some(&truth), true, 0).unwrap();
//! assert_eq!(stats.count, 1);
//!
//! // Decode the same tensor into pixel-space detections.
//! let detections = layer.detections(0, 448, 448, 0.2, false);
//! assert_eq!(detections.len(), 4);
//! ```
//!
//! # Modules
//!
//! - [`geometry`]: Bounding box quadruple with IoU and RMSE comparisons
//! - [`layout`]: Flat-offset addressing of the grid tensors
//! - [`matcher`]: Responsible-predictor selection with override policies
//! - [`loss`]: Gradient accumulation and batch diagnostics
//! - [`decoder`]: Inference decoding into per-predictor detections
//! - [`layer`]: The detection layer and its configuration
//! - [`bridge`]: Host staging boundary for accelerator backends
//! - [`error`]: Error types

pub mod bridge;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod layout;
pub mod loss;
pub mod matcher;
pub mod prelude;

pub use bridge::DeviceBridge;
pub use decoder::{decode, Detection};
pub use error::{DetectarError, Result};
pub use geometry::BBox;
pub use layer::{DetectionConfig, DetectionLayer};
pub use layout::GridLayout;
pub use loss::DetectionStats;
pub use matcher::PredictorMatcher;
