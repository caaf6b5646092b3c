//! Convenience re-exports of the types most callers need.
//!
//! ```
//! use detectar::prelude::*;
//!
//! let layer = DetectionLayer::new(DetectionConfig::default()).unwrap();
//! assert_eq!(layer.layout().cells(), 49);
//! ```

pub use crate::decoder::Detection;
pub use crate::error::{DetectarError, Result};
pub use crate::geometry::BBox;
pub use crate::layer::{DetectionConfig, DetectionLayer};
pub use crate::layout::GridLayout;
pub use crate::loss::DetectionStats;
pub use crate::matcher::PredictorMatcher;
