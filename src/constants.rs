// Mel-spectrogram input
pub const SAMPLE_RATE: usize = 12000;
pub const N_FFT: usize = 512;
pub const HOP_LENGTH: usize = 256;
pub const N_MELS: usize = 96;
pub const CLIP_SECONDS: f64 = 29.12;
/// 29.12 s at 12 kHz, the fixed analysis window every clip is framed to.
pub const N_SAMPLES: usize = (CLIP_SECONDS * SAMPLE_RATE as f64) as usize;
/// Centered STFT frames: one frame per hop plus the initial frame.
pub const N_FRAMES: usize = N_SAMPLES / HOP_LENGTH + 1;

// Network output
pub const NUM_TAGS: usize = 50;
pub const FEATURE_DIM: usize = 32;

// Collapse target between the conv stack and the recurrent stack
pub const SEQ_STEPS: usize = 15;
pub const SEQ_FEATURES: usize = 128;
