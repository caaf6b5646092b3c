//! Flat-offset addressing for the detection grid.
//!
//! The prediction tensor for one image is three contiguous blocks:
//! class scores (`side²·classes`, grouped by cell), objectness scores
//! (`side²·num`, grouped by cell then predictor), and box coordinates
//! (`side²·num·coords`, grouped by cell, predictor, coordinate).
//! The ground-truth tensor holds one `1 + coords + classes` record per
//! (image, cell): presence flag, one-hot class flags, then the box.
//!
//! Training and inference must both address tensors through this type so
//! the two paths cannot drift apart.

use serde::{Deserialize, Serialize};

/// Pure addressing logic for the grid tensors. No state beyond the
/// layer dimensions; all methods are O(1) arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    side: usize,
    num: usize,
    classes: usize,
    coords: usize,
}

impl GridLayout {
    /// Create a layout for a `side × side` grid with `num` predictors
    /// and `classes` class scores per cell.
    #[must_use]
    pub fn new(side: usize, num: usize, classes: usize, coords: usize) -> Self {
        Self {
            side,
            num,
            classes,
            coords,
        }
    }

    /// Grid side length.
    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Predictors per cell.
    #[must_use]
    pub fn num(&self) -> usize {
        self.num
    }

    /// Class scores per cell.
    #[must_use]
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Box coordinate count.
    #[must_use]
    pub fn coords(&self) -> usize {
        self.coords
    }

    /// Number of grid cells, `side²`.
    #[must_use]
    pub fn cells(&self) -> usize {
        self.side * self.side
    }

    /// Prediction tensor length per image. The layer's `inputs`
    /// parameter must equal this value.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.cells() * ((1 + self.coords) * self.num + self.classes)
    }

    /// Ground-truth record length per cell.
    #[must_use]
    pub fn truth_stride(&self) -> usize {
        1 + self.coords + self.classes
    }

    /// Ground-truth tensor length for a batch.
    #[must_use]
    pub fn truth_len(&self, batch: usize) -> usize {
        batch * self.cells() * self.truth_stride()
    }

    /// Offset of a cell's first class score.
    #[must_use]
    pub fn class_offset(&self, batch: usize, cell: usize) -> usize {
        batch * self.inputs() + cell * self.classes
    }

    /// Offset of one predictor's objectness score.
    #[must_use]
    pub fn objectness_offset(&self, batch: usize, cell: usize, pred: usize) -> usize {
        batch * self.inputs() + self.cells() * self.classes + cell * self.num + pred
    }

    /// Offset of one predictor's first box coordinate.
    #[must_use]
    pub fn box_offset(&self, batch: usize, cell: usize, pred: usize) -> usize {
        batch * self.inputs()
            + self.cells() * (self.classes + self.num)
            + (cell * self.num + pred) * self.coords
    }

    /// Offset of a cell's ground-truth record (presence flag first).
    #[must_use]
    pub fn truth_offset(&self, batch: usize, cell: usize) -> usize {
        (batch * self.cells() + cell) * self.truth_stride()
    }
}
