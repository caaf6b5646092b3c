//! Host staging boundary for accelerator execution.
//!
//! The loss walk is host-side code that mutates one gradient buffer in
//! place, so a device backend must treat it as a full barrier: copy the
//! tensors in, run to completion, copy the results out. Pure inference
//! skips the round-trip entirely with a device-side copy.

use crate::layer::DetectionLayer;
use crate::loss::DetectionStats;

/// Transfer contract a device backend implements to run the layer.
///
/// All methods are synchronous; the staged forward performs no overlap
/// between the pull, compute, and push phases.
pub trait DeviceBridge {
    /// Copy the layer input from device memory into `host`.
    fn pull_input(&mut self, host: &mut [f32]);

    /// Copy the ground truth into `host`; return `false` when no truth
    /// tensor is bound (pure inference).
    fn pull_truth(&mut self, host: &mut [f32]) -> bool;

    /// Copy the finished output tensor back to device memory.
    fn push_output(&mut self, host: &[f32]);

    /// Copy the finished gradient tensor back to device memory.
    fn push_delta(&mut self, host: &[f32]);

    /// Device-side input → output copy for the inference short-circuit.
    fn copy_input_to_output(&mut self);
}

impl DetectionLayer {
    /// Run the layer through a device staging boundary.
    ///
    /// Without `train` the device copies input to output directly and no
    /// host work happens. Otherwise the input and truth tensors are
    /// pulled into host scratch buffers, the host forward runs to
    /// completion, and the output and gradient tensors are pushed back
    /// before returning.
    pub fn forward_staged<B: DeviceBridge>(
        &mut self,
        bridge: &mut B,
        train: bool,
        seen: usize,
    ) -> Option<DetectionStats> {
        if !train {
            bridge.copy_input_to_output();
            return None;
        }

        let mut input = vec![0.0f32; self.output().len()];
        bridge.pull_input(&mut input);
        let mut truth = vec![0.0f32; self.layout().truth_len(self.config().batch)];
        let has_truth = bridge.pull_truth(&mut truth);
        let truth = has_truth.then_some(&truth[..]);

        let stats = self.forward(&input, truth, true, seen);
        bridge.push_output(self.output());
        bridge.push_delta(self.delta());
        stats
    }
}
