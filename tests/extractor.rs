//! End-to-end spectrogram extraction from synthesized WAV files.

use std::path::{Path, PathBuf};

use music_tagger_crnn::constants::{N_FRAMES, N_MELS, SAMPLE_RATE};
use music_tagger_crnn::preprocessing::spectrogram;
use music_tagger_crnn::TensorLayout;

/// Writes a mono 16-bit WAV of a 220 Hz tone.
fn write_tone(dir: &Path, name: &str, sample_rate: u32, seconds: f64) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let n = (sample_rate as f64 * seconds) as usize;
    for i in 0..n {
        let t = i as f64 / sample_rate as f64;
        let v = (2.0 * std::f64::consts::PI * 220.0 * t).sin();
        writer.write_sample((v * i16::MAX as f64 * 0.5) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[test]
fn short_clip_yields_the_fixed_shape_in_both_layouts() {
    let dir = tempfile::tempdir().unwrap();
    // 5 s at the target rate, so the waveform is padded, never resampled
    let path = write_tone(dir.path(), "short.wav", SAMPLE_RATE as u32, 5.0);

    let first = spectrogram::extract(&path, TensorLayout::ChannelsFirst).unwrap();
    assert_eq!(first.dim(), (1, N_MELS, N_FRAMES));

    let last = spectrogram::extract(&path, TensorLayout::ChannelsLast).unwrap();
    assert_eq!(last.dim(), (N_MELS, N_FRAMES, 1));

    // same spectral content, only the channel axis position differs
    assert_eq!(first[[0, 10, 10]], last[[10, 10, 0]]);
}

#[test]
fn long_clip_is_trimmed_to_the_same_fixed_shape() {
    let dir = tempfile::tempdir().unwrap();
    // 35 s > 29.12 s, exercising the centered trim
    let path = write_tone(dir.path(), "long.wav", SAMPLE_RATE as u32, 35.0);

    let spec = spectrogram::extract(&path, TensorLayout::ChannelsFirst).unwrap();
    assert_eq!(spec.dim(), (1, N_MELS, N_FRAMES));
}

#[test]
fn off_rate_audio_is_resampled_to_the_target_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tone(dir.path(), "cd_rate.wav", 44100, 3.0);

    let spec = spectrogram::extract(&path, TensorLayout::ChannelsFirst).unwrap();
    assert_eq!(spec.dim(), (1, N_MELS, N_FRAMES));
}
