use std::path::Path;

use ndarray::{Array3, Axis};

use crate::constants::SAMPLE_RATE;
use crate::error::TaggerResult;
use crate::preprocessing::{framing, load_audio, mel};
use crate::TensorLayout;

/// Reads an audio file and produces the network's fixed-shape spectrogram
/// input.
///
/// The waveform is resampled to 12 kHz, framed to exactly 29.12 s (tail
/// padding for short clips, centered trimming for long ones), converted to a
/// 96-band log-power mel spectrogram of 1366 frames, and given a singleton
/// channel axis at the position the layout convention dictates.
///
/// # Arguments
///
/// * `path` - An audio file decodable by an available backend.
/// * `layout` - Where to put the channel axis.
///
/// # Returns
///
/// * A (1, 96, 1366) tensor for `ChannelsFirst`, (96, 1366, 1) for
///   `ChannelsLast`.
pub fn extract<P: AsRef<Path>>(path: P, layout: TensorLayout) -> TaggerResult<Array3<f32>> {
    let waveform = load_audio::load_waveform(path, SAMPLE_RATE as u32)?;
    let waveform = framing::fit_to_window(waveform);
    let melgram = mel::log_mel_spectrogram(
        waveform
            .as_slice()
            .expect("freshly framed waveform is contiguous"),
    );

    let spectrogram = match layout {
        TensorLayout::ChannelsFirst => melgram.insert_axis(Axis(0)),
        TensorLayout::ChannelsLast => melgram.insert_axis(Axis(2)),
    };
    Ok(spectrogram)
}
