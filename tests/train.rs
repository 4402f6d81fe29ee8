//! Smoke test for the batch training entry point.

use candle_core::{Device, Tensor};

use music_tagger_crnn::constants::{N_FRAMES, N_MELS, NUM_TAGS};
use music_tagger_crnn::network::train::{
    Batch, BatchSource, EpochMetrics, TrainCallback, TrainOptions,
};
use music_tagger_crnn::{MusicTagger, TaggerConfig, TensorLayout, WeightSource};

/// Hands out the same single batch every epoch.
struct OneBatch {
    device: Device,
    served: bool,
}

impl BatchSource for OneBatch {
    fn num_batches(&self) -> usize {
        1
    }

    fn next_batch(&mut self) -> music_tagger_crnn::TaggerResult<Option<Batch>> {
        if self.served {
            return Ok(None);
        }
        self.served = true;
        let spectrograms = Tensor::zeros(
            (1, 1, N_MELS, N_FRAMES),
            candle_core::DType::F32,
            &self.device,
        )?;
        let mut labels = vec![0f32; NUM_TAGS];
        labels[0] = 1.0;
        labels[9] = 1.0;
        let labels = Tensor::from_vec(labels, (1, NUM_TAGS), &self.device)?;
        Ok(Some(Batch {
            spectrograms,
            labels,
        }))
    }

    fn reset(&mut self) {
        self.served = false;
    }
}

struct Recorder {
    epochs_seen: usize,
}

impl TrainCallback for Recorder {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) -> music_tagger_crnn::TaggerResult<()> {
        self.epochs_seen += 1;
        assert!(metrics.loss.is_finite());
        assert!((0.0..=1.0).contains(&metrics.accuracy));
        Ok(())
    }
}

#[test]
fn one_epoch_of_training_runs_and_reports_metrics() {
    let device = Device::Cpu;
    let model = MusicTagger::new(
        TaggerConfig {
            weights: WeightSource::Random,
            include_top: true,
            layout: TensorLayout::ChannelsFirst,
        },
        device.clone(),
    )
    .unwrap();

    let mut train = OneBatch {
        device,
        served: false,
    };
    let mut recorder = Recorder { epochs_seen: 0 };
    let history = model
        .fit(
            &mut train,
            None,
            TrainOptions {
                epochs: 1,
                learning_rate: 5e-3,
            },
            &mut [&mut recorder],
        )
        .unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(recorder.epochs_seen, 1);
    assert!(history[0].val_loss.is_none());
}
