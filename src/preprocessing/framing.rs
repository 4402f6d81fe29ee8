use ndarray::{concatenate, s, Array1, Axis};

use crate::constants::N_SAMPLES;

/// Fits a waveform to the fixed 349 440-sample analysis window.
///
/// Short signals are padded with zeros at the tail; long signals are trimmed
/// to the centered slice. The asymmetry (tail padding vs. centered trimming)
/// is inherited from the published weights' training pipeline and must not
/// be changed without retraining.
///
/// # Arguments
///
/// * `waveform` - Mono samples at the target sample rate.
///
/// # Returns
///
/// * A waveform of exactly `N_SAMPLES` samples.
pub fn fit_to_window(waveform: Array1<f32>) -> Array1<f32> {
    let n = waveform.len();
    if n < N_SAMPLES {
        let padding = Array1::zeros(N_SAMPLES - n);
        concatenate(Axis(0), &[waveform.view(), padding.view()])
            .expect("1-d concatenation of equal-rank arrays cannot fail")
    } else if n > N_SAMPLES {
        let start = (n - N_SAMPLES) / 2;
        waveform.slice(s![start..start + N_SAMPLES]).to_owned()
    } else {
        waveform
    }
}
