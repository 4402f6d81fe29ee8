//! Candle execution of the CRNN plan.
//!
//! The model is built from the stage descriptors in [`super::plan`]; the
//! descriptors are shape-traced before any tensor is allocated, so a plan
//! whose collapse target cannot hold never reaches execution. Internally
//! everything runs channels-first; channels-last input is permuted once at
//! the model boundary.

use std::str::FromStr;

use candle_core::{DType, Device, Module, ModuleT, Tensor, D};
use candle_nn::{
    batch_norm, conv2d, linear, ops, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear,
    VarBuilder, VarMap,
};
use ndarray::{Array2, Array3};

use crate::error::{TaggerError, TaggerResult};
use crate::network::plan::{self, AxisAssignment, Stage};
use crate::network::weights::{self, WeightCache};
use crate::TensorLayout;

/// Where the model's parameters come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    /// Random initialization; the model is set up for training with a
    /// binary cross-entropy objective.
    Random,
    /// Weights pre-trained on the Million Song Dataset, fetched and cached
    /// on first use. Inference-only.
    MillionSong,
}

impl FromStr for WeightSource {
    type Err = TaggerError;

    fn from_str(s: &str) -> TaggerResult<Self> {
        match s {
            "random" => Ok(Self::Random),
            "msd" => Ok(Self::MillionSong),
            other => Err(TaggerError::InvalidWeightSource(other.to_string())),
        }
    }
}

/// Construction parameters for [`MusicTagger`].
#[derive(Debug, Clone, Copy)]
pub struct TaggerConfig {
    pub weights: WeightSource,
    /// Keep the 50-unit sigmoid output layer; without it the network yields
    /// the 32-dim penultimate features.
    pub include_top: bool,
    pub layout: TensorLayout,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            weights: WeightSource::MillionSong,
            include_top: true,
            layout: TensorLayout::ChannelsFirst,
        }
    }
}

/// A single GRU layer, stepped over the full sequence.
///
/// Gate math follows the canonical orientation the published weight files
/// use: reset/update/candidate chunks in that order, the reset gate applied
/// to the recurrent contribution of the candidate.
#[derive(Debug)]
struct Gru {
    w_ih: Tensor,
    w_hh: Tensor,
    b_ih: Tensor,
    b_hh: Tensor,
    hidden: usize,
}

impl Gru {
    fn new(in_dim: usize, hidden: usize, vb: VarBuilder) -> TaggerResult<Self> {
        let init = candle_nn::init::DEFAULT_KAIMING_UNIFORM;
        Ok(Self {
            w_ih: vb.get_with_hints((3 * hidden, in_dim), "weight_ih", init)?,
            w_hh: vb.get_with_hints((3 * hidden, hidden), "weight_hh", init)?,
            b_ih: vb.get_with_hints(3 * hidden, "bias_ih", candle_nn::Init::Const(0.))?,
            b_hh: vb.get_with_hints(3 * hidden, "bias_hh", candle_nn::Init::Const(0.))?,
            hidden,
        })
    }

    fn step(&self, x_t: &Tensor, h: &Tensor) -> TaggerResult<Tensor> {
        let gates_x = x_t.matmul(&self.w_ih.t()?)?.broadcast_add(&self.b_ih)?;
        let gates_h = h.matmul(&self.w_hh.t()?)?.broadcast_add(&self.b_hh)?;
        let gx = gates_x.chunk(3, D::Minus1)?;
        let gh = gates_h.chunk(3, D::Minus1)?;

        let reset = ops::sigmoid(&(&gx[0] + &gh[0])?)?;
        let update = ops::sigmoid(&(&gx[1] + &gh[1])?)?;
        let candidate = (&gx[2] + (reset * &gh[2])?)?.tanh()?;

        // h' = update * h + (1 - update) * candidate
        let keep = (&update * h)?;
        let new = (update.affine(-1.0, 1.0)? * candidate)?;
        Ok((keep + new)?)
    }

    /// Runs the layer over (B, T, F) input, returning every step: (B, T, H).
    fn seq(&self, input: &Tensor) -> TaggerResult<Tensor> {
        let (batch, steps, _) = input.dims3()?;
        let mut h = Tensor::zeros((batch, self.hidden), input.dtype(), input.device())?;
        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let x_t = input.narrow(1, t, 1)?.squeeze(1)?;
            h = self.step(&x_t, &h)?;
            outputs.push(h.clone());
        }
        Ok(Tensor::stack(&outputs, 1)?)
    }

    /// Runs the layer over (B, T, F) input, returning the final state: (B, H).
    fn last(&self, input: &Tensor) -> TaggerResult<Tensor> {
        let (batch, steps, _) = input.dims3()?;
        let mut h = Tensor::zeros((batch, self.hidden), input.dtype(), input.device())?;
        for t in 0..steps {
            let x_t = input.narrow(1, t, 1)?.squeeze(1)?;
            h = self.step(&x_t, &h)?;
        }
        Ok(h)
    }
}

/// A stage descriptor bound to its candle modules.
#[derive(Debug)]
enum Layer {
    PadTime(usize),
    FreqNorm(BatchNorm),
    Conv(Conv2d),
    ChannelNorm(BatchNorm),
    Elu,
    Pool(usize),
    Collapse { steps: usize, features: usize },
    Gru { cell: Gru, return_sequences: bool },
    Dense(Linear),
}

fn build_layers(stages: &[Stage], vb: &VarBuilder) -> TaggerResult<Vec<Layer>> {
    let norm_config = BatchNormConfig {
        eps: 1e-3,
        remove_mean: true,
        affine: true,
        momentum: 0.1,
    };

    let mut layers = Vec::with_capacity(stages.len());
    // channel count flowing into the next conv, feature width into the next
    // recurrent/dense stage
    let mut in_channels = 1;
    let mut in_features = 0;

    for stage in stages {
        let layer = match *stage {
            Stage::PadTime { amount } => Layer::PadTime(amount),
            Stage::FreqNorm { name, features } => {
                Layer::FreqNorm(batch_norm(features, norm_config, vb.pp(name))?)
            }
            Stage::Conv {
                name,
                filters,
                kernel,
            } => {
                let config = Conv2dConfig {
                    padding: kernel / 2,
                    ..Default::default()
                };
                let conv = conv2d(in_channels, filters, kernel, config, vb.pp(name))?;
                in_channels = filters;
                Layer::Conv(conv)
            }
            Stage::ChannelNorm { name, features } => {
                Layer::ChannelNorm(batch_norm(features, norm_config, vb.pp(name))?)
            }
            Stage::Elu => Layer::Elu,
            Stage::Pool { size } => Layer::Pool(size),
            Stage::Collapse { steps, features } => {
                in_features = features;
                Layer::Collapse { steps, features }
            }
            Stage::Gru {
                name,
                hidden,
                return_sequences,
            } => {
                let cell = Gru::new(in_features, hidden, vb.pp(name))?;
                in_features = hidden;
                Layer::Gru {
                    cell,
                    return_sequences,
                }
            }
            Stage::Dense { name, units } => Layer::Dense(linear(in_features, units, vb.pp(name))?),
        };
        layers.push(layer);
    }

    Ok(layers)
}

/// The convolutional-recurrent music tagger.
///
/// Weights are read-only once construction finishes; concurrent inference
/// is as safe as the underlying execution engine makes it.
pub struct MusicTagger {
    layers: Vec<Layer>,
    pub(crate) varmap: VarMap,
    pub(crate) device: Device,
    pub(crate) trainable: bool,
    layout: TensorLayout,
    include_top: bool,
}

impl MusicTagger {
    /// Builds the network on a device.
    ///
    /// `WeightSource::Random` leaves the parameters at their initialization
    /// and keeps the model trainable. `WeightSource::MillionSong` fetches
    /// the cached weight artifact for the configured layout and restores it
    /// by layer name; the result is inference-only.
    pub fn new(config: TaggerConfig, device: Device) -> TaggerResult<Self> {
        let stages = plan::architecture(config.include_top);
        // prove the collapse target before allocating anything
        plan::trace_shapes(&stages)?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layers = build_layers(&stages, &vb)?;

        let trainable = match config.weights {
            WeightSource::Random => true,
            WeightSource::MillionSong => {
                let cache = WeightCache::new()?;
                let path = cache.ensure(config.layout)?;
                weights::load_named_weights(&varmap, &path, &device)?;
                false
            }
        };

        Ok(Self {
            layers,
            varmap,
            device,
            trainable,
            layout: config.layout,
            include_top: config.include_top,
        })
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn include_top(&self) -> bool {
        self.include_top
    }

    /// Validates a batched input against the configured layout and permutes
    /// it into the canonical channels-first order.
    pub(crate) fn canonicalize(&self, input: Tensor) -> TaggerResult<Tensor> {
        let axes = AxisAssignment::for_layout(self.layout);
        let expected = axes.input_shape();
        let dims = input.dims();
        if dims.len() != 4 || dims[1..] != expected {
            return Err(TaggerError::ShapeMismatch {
                stage: "input",
                expected: expected.to_vec(),
                got: dims.get(1..).unwrap_or(dims).to_vec(),
            });
        }
        match self.layout {
            TensorLayout::ChannelsFirst => Ok(input),
            TensorLayout::ChannelsLast => Ok(input.permute((0, 3, 1, 2))?.contiguous()?),
        }
    }

    /// Forward pass over canonical channels-first input.
    ///
    /// Returns logits of shape (B, 50) with the top layer, or features of
    /// shape (B, 32) without it. The collapse stage re-checks the traced
    /// target against the tensor it actually receives.
    pub(crate) fn forward_t(&self, input: &Tensor, train: bool) -> TaggerResult<Tensor> {
        let mut x = input.clone();
        for layer in &self.layers {
            x = match layer {
                Layer::PadTime(amount) => x.pad_with_zeros(3, *amount, *amount)?,
                Layer::FreqNorm(bn) => {
                    // candle batch norm works on axis 1, so swap frequency in
                    let swapped = x.transpose(1, 2)?.contiguous()?;
                    bn.forward_t(&swapped, train)?.transpose(1, 2)?.contiguous()?
                }
                Layer::Conv(conv) => conv.forward(&x)?,
                Layer::ChannelNorm(bn) => bn.forward_t(&x, train)?,
                Layer::Elu => x.elu(1.0)?,
                Layer::Pool(size) => x.max_pool2d(*size)?,
                Layer::Collapse { steps, features } => {
                    let (batch, channels, freq, time) = x.dims4()?;
                    if time != *steps || channels * freq != *features {
                        return Err(TaggerError::ShapeMismatch {
                            stage: "collapse",
                            expected: vec![*steps, *features],
                            got: vec![time, channels * freq],
                        });
                    }
                    x.permute((0, 3, 1, 2))?
                        .contiguous()?
                        .reshape((batch, *steps, *features))?
                }
                Layer::Gru {
                    cell,
                    return_sequences,
                } => {
                    if *return_sequences {
                        cell.seq(&x)?
                    } else {
                        cell.last(&x)?
                    }
                }
                Layer::Dense(lin) => lin.forward(&x)?,
            };
        }
        Ok(x)
    }

    /// Runs inference on a batch of spectrograms.
    ///
    /// # Arguments
    ///
    /// * `spectrograms` - Extractor outputs in this model's layout.
    ///
    /// # Returns
    ///
    /// * (B, 50) per-tag probabilities with the top layer, (B, 32) raw
    ///   features without it.
    pub fn predict(&self, spectrograms: &[Array3<f32>]) -> TaggerResult<Array2<f32>> {
        let input = self.batch_to_tensor(spectrograms)?;
        let input = self.canonicalize(input)?;
        let out = self.forward_t(&input, false)?;
        let out = if self.include_top {
            ops::sigmoid(&out)?
        } else {
            out
        };

        let (batch, dim) = out.dims2()?;
        let flat = out.flatten_all()?.to_vec1::<f32>()?;
        Ok(Array2::from_shape_vec((batch, dim), flat)
            .expect("tensor element count matches its dimensions"))
    }

    fn batch_to_tensor(&self, spectrograms: &[Array3<f32>]) -> TaggerResult<Tensor> {
        let axes = AxisAssignment::for_layout(self.layout);
        let expected = axes.input_shape();
        let mut singles = Vec::with_capacity(spectrograms.len());
        for spec in spectrograms {
            let (a, b, c) = spec.dim();
            if [a, b, c] != expected {
                return Err(TaggerError::ShapeMismatch {
                    stage: "input",
                    expected: expected.to_vec(),
                    got: vec![a, b, c],
                });
            }
            let flat: Vec<f32> = spec.iter().copied().collect();
            singles.push(Tensor::from_vec(flat, (a, b, c), &self.device)?);
        }
        Ok(Tensor::stack(&singles, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{N_FRAMES, N_MELS};

    #[test]
    fn weight_source_tokens_parse() {
        assert_eq!("msd".parse::<WeightSource>().unwrap(), WeightSource::MillionSong);
        assert_eq!("random".parse::<WeightSource>().unwrap(), WeightSource::Random);
        assert!(matches!(
            "imagenet".parse::<WeightSource>(),
            Err(TaggerError::InvalidWeightSource(_))
        ));
    }

    #[test]
    fn wrong_input_shape_is_rejected_at_the_boundary() {
        let model = MusicTagger::new(
            TaggerConfig {
                weights: WeightSource::Random,
                include_top: true,
                layout: TensorLayout::ChannelsFirst,
            },
            Device::Cpu,
        )
        .unwrap();

        let bad = Array3::<f32>::zeros((N_MELS, N_FRAMES, 1)); // channels-last shape
        assert!(matches!(
            model.predict(&[bad]),
            Err(TaggerError::ShapeMismatch { stage: "input", .. })
        ));
    }
}
