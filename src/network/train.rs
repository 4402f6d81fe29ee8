//! Generic training entry point.
//!
//! Dataset loading, fold splitting and augmentation stay outside this
//! crate; the model only needs something that hands out batches of
//! (spectrogram, label-vector) pairs and says how many batches make an
//! epoch.

use candle_core::Tensor;
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW};

use crate::error::{TaggerError, TaggerResult};
use crate::network::model::MusicTagger;

/// One training batch: spectrograms in the model's layout with a leading
/// batch axis, and multi-hot label vectors of shape (B, 50).
pub struct Batch {
    pub spectrograms: Tensor,
    pub labels: Tensor,
}

/// A supplier of batches, rewound between epochs.
pub trait BatchSource {
    /// Batches per epoch.
    fn num_batches(&self) -> usize;

    /// The next batch, or `None` once the epoch is exhausted.
    fn next_batch(&mut self) -> TaggerResult<Option<Batch>>;

    /// Rewind to the start of the data.
    fn reset(&mut self);
}

/// Loss and per-tag accuracy over one epoch.
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// Invoked after every epoch with that epoch's metrics.
pub trait TrainCallback {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) -> TaggerResult<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 5e-3,
        }
    }
}

/// Fraction of (tag, example) cells where the thresholded prediction
/// agrees with the label.
fn binary_accuracy(logits: &Tensor, labels: &Tensor) -> TaggerResult<f32> {
    let predicted = candle_nn::ops::sigmoid(logits)?.ge(0.5)?;
    let actual = labels.ge(0.5)?;
    let agree = predicted
        .eq(&actual)?
        .to_dtype(candle_core::DType::F32)?
        .mean_all()?;
    Ok(agree.to_scalar::<f32>()?)
}

impl MusicTagger {
    /// Trains with binary cross-entropy on the output logits, the objective
    /// matching 50 independent per-tag sigmoid units.
    ///
    /// # Arguments
    ///
    /// * `train` - Training batches, one pass per epoch.
    /// * `validation` - Optional held-out batches, evaluated after each epoch.
    /// * `options` - Epoch count and learning rate.
    /// * `callbacks` - Invoked with the metrics of every finished epoch.
    ///
    /// # Returns
    ///
    /// * Per-epoch metrics, in order.
    pub fn fit(
        &self,
        train: &mut dyn BatchSource,
        mut validation: Option<&mut dyn BatchSource>,
        options: TrainOptions,
        callbacks: &mut [&mut dyn TrainCallback],
    ) -> TaggerResult<Vec<EpochMetrics>> {
        if !self.trainable {
            return Err(TaggerError::InferenceOnly);
        }

        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: options.learning_rate,
                ..Default::default()
            },
        )?;

        let mut history = Vec::with_capacity(options.epochs);
        for epoch in 0..options.epochs {
            train.reset();
            let mut loss_sum = 0f32;
            let mut acc_sum = 0f32;
            let mut seen = 0usize;

            while let Some(batch) = train.next_batch()? {
                let input = self.canonicalize(batch.spectrograms)?;
                let logits = self.forward_t(&input, true)?;
                let loss = loss::binary_cross_entropy_with_logit(&logits, &batch.labels)?;
                optimizer.backward_step(&loss)?;

                loss_sum += loss.to_scalar::<f32>()?;
                acc_sum += binary_accuracy(&logits, &batch.labels)?;
                seen += 1;
                if seen >= train.num_batches() {
                    break;
                }
            }
            let denom = seen.max(1) as f32;

            let (val_loss, val_accuracy) = match validation.as_mut() {
                Some(source) => {
                    let (l, a) = self.evaluate(&mut **source)?;
                    (Some(l), Some(a))
                }
                None => (None, None),
            };

            let metrics = EpochMetrics {
                epoch,
                loss: loss_sum / denom,
                accuracy: acc_sum / denom,
                val_loss,
                val_accuracy,
            };
            log::info!(
                "epoch {}: loss {:.4}, accuracy {:.4}",
                metrics.epoch,
                metrics.loss,
                metrics.accuracy
            );
            for callback in callbacks.iter_mut() {
                callback.on_epoch_end(&metrics)?;
            }
            history.push(metrics);
        }

        Ok(history)
    }

    /// Average loss and per-tag accuracy over one pass of a batch source.
    pub fn evaluate(&self, source: &mut dyn BatchSource) -> TaggerResult<(f32, f32)> {
        source.reset();
        let mut loss_sum = 0f32;
        let mut acc_sum = 0f32;
        let mut seen = 0usize;

        while let Some(batch) = source.next_batch()? {
            let input = self.canonicalize(batch.spectrograms)?;
            let logits = self.forward_t(&input, false)?;
            let loss = loss::binary_cross_entropy_with_logit(&logits, &batch.labels)?;
            loss_sum += loss.to_scalar::<f32>()?;
            acc_sum += binary_accuracy(&logits, &batch.labels)?;
            seen += 1;
            if seen >= source.num_batches() {
                break;
            }
        }

        let denom = seen.max(1) as f32;
        Ok((loss_sum / denom, acc_sum / denom))
    }
}
