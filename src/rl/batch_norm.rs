//! Batch normalization with an explicit train/eval switch
//!
//! Burn's stock `BatchNorm` picks batch or running statistics from whether the
//! backend records gradients. The agent needs to choose per call (acting in
//! train mode on the inference backend, for instance), so the mode is passed in.

use burn::module::{Module, Param, RunningState};
use burn::nn::Initializer;
use burn::tensor::{backend::Backend, Tensor};

use super::network::ExecutionMode;

const MOMENTUM: f64 = 0.1;
const EPSILON: f64 = 1e-5;

/// Per-channel normalization of `[batch, channels, height, width]` inputs
#[derive(Module, Debug)]
pub struct ModeBatchNorm<B: Backend> {
    gamma: Param<Tensor<B, 1>>,
    beta: Param<Tensor<B, 1>>,
    running_mean: RunningState<Tensor<B, 1>>,
    running_var: RunningState<Tensor<B, 1>>,
}

impl<B: Backend> ModeBatchNorm<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma: Initializer::Ones.init([channels], device),
            beta: Initializer::Zeros.init([channels], device),
            running_mean: RunningState::new(Tensor::zeros([channels], device)),
            running_var: RunningState::new(Tensor::ones([channels], device)),
        }
    }

    /// Normalize `input`, refreshing the running statistics in train mode
    pub fn forward(&self, input: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 4> {
        self.normalize(input, mode, true)
    }

    /// Like [`forward`](Self::forward), but never touches the running statistics
    ///
    /// Train mode still normalizes with batch statistics.
    pub fn forward_frozen(&self, input: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 4> {
        self.normalize(input, mode, false)
    }

    fn normalize(&self, input: Tensor<B, 4>, mode: ExecutionMode, track: bool) -> Tensor<B, 4> {
        let [batch, channels, height, width] = input.dims();
        let count = batch * height * width;

        // A single value per channel has no spread; use the running statistics
        let (mean, var) = match mode {
            ExecutionMode::Train if count > 1 => {
                let flat = input
                    .clone()
                    .swap_dims(0, 1)
                    .reshape([channels, count]);
                let mean = flat.clone().mean_dim(1);
                let var = (flat - mean.clone()).powf_scalar(2.0).mean_dim(1);

                let mean: Tensor<B, 1> = mean.reshape([channels]);
                let var: Tensor<B, 1> = var.reshape([channels]);
                if track {
                    self.update_running(mean.clone(), var.clone(), count);
                }
                (mean, var)
            }
            _ => (self.running_mean.value(), self.running_var.value()),
        };

        let mean = mean.reshape([1, channels, 1, 1]);
        let std = var.add_scalar(EPSILON).sqrt().reshape([1, channels, 1, 1]);
        let gamma = self.gamma.val().reshape([1, channels, 1, 1]);
        let beta = self.beta.val().reshape([1, channels, 1, 1]);

        (input - mean).div(std).mul(gamma).add(beta)
    }

    fn update_running(&self, mean: Tensor<B, 1>, var: Tensor<B, 1>, count: usize) {
        // Running variance tracks the unbiased estimate
        let var = var.mul_scalar(count as f64 / (count - 1) as f64);

        let running_mean = self
            .running_mean
            .value_sync()
            .mul_scalar(1.0 - MOMENTUM)
            .add(mean.detach().mul_scalar(MOMENTUM));
        let running_var = self
            .running_var
            .value_sync()
            .mul_scalar(1.0 - MOMENTUM)
            .add(var.detach().mul_scalar(MOMENTUM));

        self.running_mean.update(running_mean.detach());
        self.running_var.update(running_var.detach());
    }

    pub fn running_mean(&self) -> Tensor<B, 1> {
        self.running_mean.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn input(device: &NdArrayDevice) -> Tensor<TestBackend, 4> {
        // Two channels, constant 4.0 and ramp 0..4
        let values = vec![4.0, 4.0, 4.0, 4.0, 0.0, 1.0, 2.0, 3.0];
        Tensor::from_data(TensorData::new(values, [1, 2, 2, 2]), device)
    }

    #[test]
    fn test_train_mode_normalizes_batch() {
        let device = NdArrayDevice::default();
        let norm = ModeBatchNorm::<TestBackend>::new(2, &device);

        let output = norm.forward(input(&device), ExecutionMode::Train);
        let values = output.to_data().to_vec::<f32>().unwrap();

        // Constant channel collapses to zero, ramp channel has zero mean
        assert!(values[..4].iter().all(|v| v.abs() < 1e-3));
        let ramp_mean: f32 = values[4..].iter().sum::<f32>() / 4.0;
        assert!(ramp_mean.abs() < 1e-4);
    }

    #[test]
    fn test_train_mode_updates_running_stats() {
        let device = NdArrayDevice::default();
        let norm = ModeBatchNorm::<TestBackend>::new(2, &device);

        norm.forward(input(&device), ExecutionMode::Train);
        let mean = norm.running_mean().to_data().to_vec::<f32>().unwrap();

        assert!((mean[0] - 0.4).abs() < 1e-5, "got {}", mean[0]);
        assert!((mean[1] - 0.15).abs() < 1e-5, "got {}", mean[1]);
    }

    #[test]
    fn test_frozen_forward_uses_batch_stats_without_updating() {
        let device = NdArrayDevice::default();
        let norm = ModeBatchNorm::<TestBackend>::new(2, &device);

        let tracked = norm.forward(input(&device), ExecutionMode::Train);
        let before = norm.running_mean().to_data();

        let frozen = norm.forward_frozen(input(&device), ExecutionMode::Train);
        assert_eq!(norm.running_mean().to_data(), before);
        tracked.into_data().assert_approx_eq(&frozen.into_data(), 5);
    }

    #[test]
    fn test_single_value_per_channel_falls_back_to_running_stats() {
        let device = NdArrayDevice::default();
        let norm = ModeBatchNorm::<TestBackend>::new(2, &device);
        let single = Tensor::from_data(TensorData::new(vec![3.0f32, -2.0], [1, 2, 1, 1]), &device);

        let values = norm
            .forward(single, ExecutionMode::Train)
            .to_data()
            .to_vec::<f32>()
            .unwrap();

        // Fresh running stats (mean 0, var 1) keep the input instead of zeroing it
        assert!((values[0] - 3.0).abs() < 1e-3, "got {}", values[0]);
        assert!((values[1] + 2.0).abs() < 1e-3, "got {}", values[1]);
        let mean = norm.running_mean().to_data().to_vec::<f32>().unwrap();
        assert_eq!(mean, vec![0.0, 0.0]);
    }

    #[test]
    fn test_eval_mode_leaves_running_stats() {
        let device = NdArrayDevice::default();
        let norm = ModeBatchNorm::<TestBackend>::new(2, &device);

        // Fresh running stats are mean 0, var 1, so eval is nearly the identity
        let output = norm.forward(input(&device), ExecutionMode::Eval);
        let values = output.to_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 4.0).abs() < 1e-3);

        let mean = norm.running_mean().to_data().to_vec::<f32>().unwrap();
        assert_eq!(mean, vec![0.0, 0.0]);
    }
}
