//! Declarative description of the CRNN architecture.
//!
//! The network is an ordered list of stage descriptors rather than an
//! opaque layer graph: the same list drives both the pure shape tracer
//! (which proves the conv stack really collapses to 15 steps of 128
//! features) and the candle module construction in [`super::model`].

use crate::constants::{FEATURE_DIM, N_FRAMES, N_MELS, NUM_TAGS, SEQ_FEATURES, SEQ_STEPS};
use crate::error::{TaggerError, TaggerResult};
use crate::TensorLayout;

/// One operation in the data flow, with its parameters and, for learnable
/// stages, the stable identifier its weights are stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Zero-pad the time axis on both sides.
    PadTime { amount: usize },
    /// Batch normalization over the frequency bins of the raw spectrogram.
    FreqNorm { name: &'static str, features: usize },
    /// 2-D convolution, square kernel, 'same' padding.
    Conv {
        name: &'static str,
        filters: usize,
        kernel: usize,
    },
    /// Batch normalization over the channel axis.
    ChannelNorm { name: &'static str, features: usize },
    /// Exponential-linear activation.
    Elu,
    /// Square max pooling, stride equal to the pool size.
    Pool { size: usize },
    /// Flatten the channel/frequency axes into a feature vector per time
    /// step. The target sizes are asserted, never assumed.
    Collapse { steps: usize, features: usize },
    /// Recurrent layer; `return_sequences` keeps the per-step outputs.
    Gru {
        name: &'static str,
        hidden: usize,
        return_sequences: bool,
    },
    /// Fully-connected output layer (sigmoid applied at inference).
    Dense { name: &'static str, units: usize },
}

/// The MusicTaggerCRNN stack.
///
/// # Arguments
///
/// * `include_top` - Whether to keep the 50-unit output layer. Without it
///   the network ends at the second GRU and yields 32-dim features.
pub fn architecture(include_top: bool) -> Vec<Stage> {
    let mut stages = vec![
        Stage::PadTime { amount: 37 },
        Stage::FreqNorm {
            name: "bn0",
            features: N_MELS,
        },
    ];

    let conv_names = ["conv1", "conv2", "conv3", "conv4"];
    let norm_names = ["bn1", "bn2", "bn3", "bn4"];
    let filters = [64, 128, 128, 128];
    let pools = [2, 3, 4, 4];
    for i in 0..4 {
        stages.push(Stage::Conv {
            name: conv_names[i],
            filters: filters[i],
            kernel: 3,
        });
        stages.push(Stage::ChannelNorm {
            name: norm_names[i],
            features: filters[i],
        });
        stages.push(Stage::Elu);
        stages.push(Stage::Pool { size: pools[i] });
    }

    stages.push(Stage::Collapse {
        steps: SEQ_STEPS,
        features: SEQ_FEATURES,
    });
    stages.push(Stage::Gru {
        name: "gru1",
        hidden: FEATURE_DIM,
        return_sequences: true,
    });
    stages.push(Stage::Gru {
        name: "gru2",
        hidden: FEATURE_DIM,
        return_sequences: false,
    });
    if include_top {
        stages.push(Stage::Dense {
            name: "output",
            units: NUM_TAGS,
        });
    }
    stages
}

/// Axis indices of a batched input tensor under a layout convention.
///
/// All layout-dependent axis logic lives here; the executing model permutes
/// channels-last input into channels-first order at its boundary and runs
/// canonically from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisAssignment {
    pub channel: usize,
    pub freq: usize,
    pub time: usize,
}

impl AxisAssignment {
    pub fn for_layout(layout: TensorLayout) -> Self {
        match layout {
            TensorLayout::ChannelsFirst => Self {
                channel: 1,
                freq: 2,
                time: 3,
            },
            TensorLayout::ChannelsLast => Self {
                channel: 3,
                freq: 1,
                time: 2,
            },
        }
    }

    /// The spectrogram shape (without batch axis) this layout expects.
    pub fn input_shape(&self) -> [usize; 3] {
        let mut shape = [0usize; 3];
        shape[self.channel - 1] = 1;
        shape[self.freq - 1] = N_MELS;
        shape[self.time - 1] = N_FRAMES;
        shape
    }
}

/// Intermediate shape in canonical (channel, freq, time) order; the
/// recurrent tail switches to (step, feature) with `freq` unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracedShape {
    pub channel: usize,
    pub freq: usize,
    pub time: usize,
}

/// Walks the architecture and computes the shape after every stage,
/// verifying the collapse target against the actual conv-stack output.
///
/// # Returns
///
/// * One shape per stage, or a `ShapeMismatch` if the collapse sizes do not
///   line up with what the conv stack really produces.
pub fn trace_shapes(stages: &[Stage]) -> TaggerResult<Vec<TracedShape>> {
    let mut shape = TracedShape {
        channel: 1,
        freq: N_MELS,
        time: N_FRAMES,
    };
    let mut traced = Vec::with_capacity(stages.len());

    for stage in stages {
        match *stage {
            Stage::PadTime { amount } => shape.time += 2 * amount,
            Stage::FreqNorm { .. } | Stage::ChannelNorm { .. } | Stage::Elu => {}
            Stage::Conv { filters, .. } => shape.channel = filters,
            Stage::Pool { size } => {
                shape.freq /= size;
                shape.time /= size;
            }
            Stage::Collapse { steps, features } => {
                if shape.time != steps || shape.channel * shape.freq != features {
                    return Err(TaggerError::ShapeMismatch {
                        stage: "collapse",
                        expected: vec![steps, features],
                        got: vec![shape.time, shape.channel * shape.freq],
                    });
                }
                shape = TracedShape {
                    channel: features,
                    freq: 1,
                    time: steps,
                };
            }
            Stage::Gru {
                hidden,
                return_sequences,
                ..
            } => {
                shape.channel = hidden;
                if !return_sequences {
                    shape.time = 1;
                }
            }
            Stage::Dense { units, .. } => shape.channel = units,
        }
        traced.push(shape);
    }

    Ok(traced)
}
