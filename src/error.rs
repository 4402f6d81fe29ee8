//! Error types for the tagger pipeline

use thiserror::Error;

use crate::constants::NUM_TAGS;

/// Errors that can occur while extracting spectrograms, building the
/// network, fetching weights or decoding predictions.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// No decoding backend compiled in for the given container format
    #[error(
        "no audio decoder available for `{extension}` files; rebuild with \
         `cargo build --features symphonia` to enable the symphonia backend, \
         or supply a WAV file"
    )]
    DecoderMissing { extension: String },

    /// Unknown weight-selection token
    #[error(
        "unknown weight source `{0}`; expected `random` (random initialization) \
         or `msd` (pre-training on the Million Song Dataset)"
    )]
    InvalidWeightSource(String),

    /// Unknown tensor-layout token
    #[error("unknown tensor layout `{0}`; expected `channels-first` or `channels-last`")]
    InvalidLayout(String),

    /// A prediction vector with the wrong number of tags
    #[error("prediction vector has length {got}, expected {NUM_TAGS}")]
    WrongVectorLength { got: usize },

    /// A top-N request outside [0, 50]
    #[error("top_n is {got}, must be within [0, {NUM_TAGS}]")]
    TopNOutOfRange { got: usize },

    /// A vocabulary with the wrong number of tags
    #[error("tag vocabulary has {got} entries, expected {NUM_TAGS}")]
    WrongVocabularySize { got: usize },

    /// A tensor whose actual shape disagrees with the traced shape
    #[error("shape mismatch at `{stage}`: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        stage: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Training requested on a model restored from pretrained weights
    #[error(
        "a model restored from pretrained weights is inference-only; \
         construct it with WeightSource::Random to train"
    )]
    InferenceOnly,

    /// Weight artifact download failure
    #[error("failed to fetch weights from {url}: {reason}")]
    WeightFetch { url: String, reason: String },

    /// No usable cache directory on this platform
    #[error("could not determine a cache directory for weight artifacts")]
    NoCacheDir,

    #[error("failed to read WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for tagger operations
pub type TaggerResult<T> = Result<T, TaggerError>;
