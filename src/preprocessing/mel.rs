//! Log-power mel spectrogram computation.
//!
//! STFT frames are centered (reflect padding of half a window on each side)
//! and weighted by a periodic Hann window, mel filters use the slaney scale
//! with slaney area normalization, matching the pipeline the published
//! weights were trained with.

use ndarray::Array2;

use crate::constants::{HOP_LENGTH, N_FFT, N_MELS, SAMPLE_RATE};

/// In-place radix-2 style recursive FFT over a real input frame.
///
/// Returns interleaved (re, im) pairs, `2 * inp.len()` values.
fn fft(inp: &[f32]) -> Vec<f32> {
    let n = inp.len();
    if n == 1 {
        return vec![inp[0], 0.0];
    }
    if n % 2 == 1 {
        return dft(inp);
    }
    let mut out = vec![0.0; n * 2];

    let mut even = Vec::with_capacity(n / 2);
    let mut odd = Vec::with_capacity(n / 2);
    for (i, &v) in inp.iter().enumerate() {
        if i % 2 == 0 {
            even.push(v);
        } else {
            odd.push(v);
        }
    }

    let even_fft = fft(&even);
    let odd_fft = fft(&odd);

    let two_pi = 2.0 * std::f32::consts::PI;
    for k in 0..n / 2 {
        let theta = two_pi * k as f32 / n as f32;
        let re = theta.cos();
        let im = -theta.sin();

        let re_odd = odd_fft[2 * k];
        let im_odd = odd_fft[2 * k + 1];

        out[2 * k] = even_fft[2 * k] + re * re_odd - im * im_odd;
        out[2 * k + 1] = even_fft[2 * k + 1] + re * im_odd + im * re_odd;

        out[2 * (k + n / 2)] = even_fft[2 * k] - re * re_odd + im * im_odd;
        out[2 * (k + n / 2) + 1] = even_fft[2 * k + 1] - re * im_odd - im * re_odd;
    }
    out
}

/// Naive DFT fallback for odd lengths.
fn dft(inp: &[f32]) -> Vec<f32> {
    let n = inp.len();
    let two_pi = 2.0 * std::f32::consts::PI;

    let mut out = Vec::with_capacity(2 * n);
    for k in 0..n {
        let mut re = 0.0;
        let mut im = 0.0;
        for (j, &v) in inp.iter().enumerate() {
            let angle = two_pi * k as f32 * j as f32 / n as f32;
            re += v * angle.cos();
            im -= v * angle.sin();
        }
        out.push(re);
        out.push(im);
    }
    out
}

fn hz_to_mel(hz: f32) -> f32 {
    // slaney scale: linear below 1 kHz, logarithmic above
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if hz < min_log_hz {
        hz / f_sp
    } else {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if mel < min_log_mel {
        mel * f_sp
    } else {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    }
}

/// Builds the triangular mel filterbank.
///
/// # Returns
///
/// * `n_mels` filters of `n_fft / 2 + 1` coefficients each, slaney-normalized.
pub fn mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: f32) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let f_max = sample_rate / 2.0;

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(f_max);
    let n_points = n_mels + 2;
    let hz_points: Vec<f32> = (0..n_points)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_points - 1) as f32))
        .collect();

    let fft_freqs: Vec<f32> = (0..n_bins)
        .map(|k| k as f32 * sample_rate / n_fft as f32)
        .collect();

    let mut filterbank = Vec::with_capacity(n_mels);
    for band in 0..n_mels {
        let (left, center, right) = (hz_points[band], hz_points[band + 1], hz_points[band + 2]);
        let enorm = 2.0 / (right - left);
        let filter: Vec<f32> = fft_freqs
            .iter()
            .map(|&f| {
                let lower = (f - left) / (center - left);
                let upper = (right - f) / (right - center);
                lower.min(upper).max(0.0) * enorm
            })
            .collect();
        filterbank.push(filter);
    }

    filterbank
}

/// Computes the log-power mel spectrogram of a mono waveform.
///
/// The output is `10 * log10(power)` against a reference level of 1.0,
/// deliberately without flooring or clipping: near-silent frames produce
/// extreme negative values rather than an error, and flooring them would
/// break compatibility with the learned weights.
///
/// # Arguments
///
/// * `samples` - Mono waveform at `SAMPLE_RATE`.
///
/// # Returns
///
/// * A (`N_MELS`, `samples.len() / HOP_LENGTH + 1`) matrix.
pub fn log_mel_spectrogram(samples: &[f32]) -> Array2<f32> {
    let n_bins = N_FFT / 2 + 1;
    let half = N_FFT / 2;

    // centered frames: reflect-pad half a window on each side
    let mut padded = Vec::with_capacity(samples.len() + N_FFT);
    for i in (1..=half).rev() {
        padded.push(samples[i.min(samples.len() - 1)]);
    }
    padded.extend_from_slice(samples);
    for i in 2..=half + 1 {
        padded.push(samples[samples.len().saturating_sub(i)]);
    }

    // periodic Hann window
    let two_pi = 2.0 * std::f32::consts::PI;
    let hann: Vec<f32> = (0..N_FFT)
        .map(|i| 0.5 * (1.0 - (two_pi * i as f32 / N_FFT as f32).cos()))
        .collect();

    let filters = mel_filterbank(N_MELS, N_FFT, SAMPLE_RATE as f32);
    let n_frames = samples.len() / HOP_LENGTH + 1;
    let mut out = Array2::zeros((N_MELS, n_frames));

    let mut frame = vec![0.0f32; N_FFT];
    for t in 0..n_frames {
        let offset = t * HOP_LENGTH;
        for (j, f) in frame.iter_mut().enumerate() {
            *f = hann[j] * padded[offset + j];
        }

        let fft_out = fft(&frame);
        let mut power = vec![0.0f32; n_bins];
        for (k, p) in power.iter_mut().enumerate() {
            let re = fft_out[2 * k];
            let im = fft_out[2 * k + 1];
            *p = re * re + im * im;
        }

        for (band, filter) in filters.iter().enumerate() {
            let energy: f32 = filter.iter().zip(power.iter()).map(|(&w, &p)| w * p).sum();
            out[[band, t]] = 10.0 * energy.log10();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{N_FRAMES, N_SAMPLES};

    #[test]
    fn fft_matches_known_impulse_response() {
        let input = vec![0.0, 1.0, 0.0, 0.0];
        let output = fft(&input);
        let expected = [1.0, 0.0, 0.0, -1.0, -1.0, 0.0, 0.0, 1.0];
        for (o, e) in output.iter().zip(expected.iter()) {
            assert!((o - e).abs() < 1e-6, "{output:?}");
        }
    }

    #[test]
    fn filterbank_covers_every_band() {
        let filters = mel_filterbank(N_MELS, N_FFT, SAMPLE_RATE as f32);
        assert_eq!(filters.len(), N_MELS);
        assert_eq!(filters[0].len(), N_FFT / 2 + 1);
        for (band, filter) in filters.iter().enumerate() {
            assert!(
                filter.iter().any(|&w| w > 0.0),
                "band {band} has no support"
            );
        }
    }

    #[test]
    fn spectrogram_of_a_full_window_is_96_by_1366() {
        let samples: Vec<f32> = (0..N_SAMPLES)
            .map(|i| (two_pi_t(i) * 440.0).sin() * 0.5)
            .collect();
        let mel = log_mel_spectrogram(&samples);
        assert_eq!(mel.dim(), (N_MELS, N_FRAMES));
    }

    #[test]
    fn pure_tone_concentrates_energy_in_one_band() {
        let samples: Vec<f32> = (0..N_SAMPLES)
            .map(|i| (two_pi_t(i) * 440.0).sin() * 0.5)
            .collect();
        let mel = log_mel_spectrogram(&samples);

        // the loudest band in a middle frame should carry far more energy
        // than a band an octave away
        let frame = mel.column(N_FRAMES / 2);
        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(loudest < N_MELS / 2, "440 Hz landed in band {loudest}");
        assert!(frame[loudest] > frame[N_MELS - 1] + 20.0);
    }

    #[test]
    fn silence_maps_to_negative_infinity_not_a_panic() {
        let samples = vec![0.0f32; N_SAMPLES];
        let mel = log_mel_spectrogram(&samples);
        assert_eq!(mel.dim(), (N_MELS, N_FRAMES));
        // no flooring: zero power maps to -inf, by contract
        assert!(mel.iter().all(|&v| v == f32::NEG_INFINITY));
    }

    fn two_pi_t(i: usize) -> f32 {
        2.0 * std::f32::consts::PI * i as f32 / SAMPLE_RATE as f32
    }
}
