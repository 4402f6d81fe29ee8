//! CRNN music auto-tagger.
//!
//! Turns an audio file into a fixed-shape log-power mel spectrogram, runs it
//! through a convolutional-recurrent network with 50 independent sigmoid
//! outputs, and decodes the resulting probability vector into a ranked list
//! of tags.

use std::str::FromStr;

pub mod constants;
pub mod decoder;
pub mod error;
pub mod tags;
pub mod preprocessing {
    pub mod framing;
    pub mod load_audio;
    pub mod mel;
    pub mod spectrogram;
}
pub mod network {
    pub mod model;
    pub mod plan;
    pub mod train;
    pub mod weights;
}

pub use decoder::PredictionDecoder;
pub use error::{TaggerError, TaggerResult};
pub use network::model::{MusicTagger, TaggerConfig, WeightSource};
pub use tags::TagVocabulary;

/// Which tensor axis carries the channel dimension.
///
/// `ChannelsFirst` spectrograms are shaped (1, 96, 1366), `ChannelsLast`
/// ones (96, 1366, 1). The network permutes channels-last input into the
/// canonical channels-first order at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    ChannelsFirst,
    ChannelsLast,
}

impl FromStr for TensorLayout {
    type Err = TaggerError;

    fn from_str(s: &str) -> TaggerResult<Self> {
        match s {
            "channels-first" => Ok(Self::ChannelsFirst),
            "channels-last" => Ok(Self::ChannelsLast),
            other => Err(TaggerError::InvalidLayout(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_tokens_parse() {
        assert_eq!(
            "channels-first".parse::<TensorLayout>().unwrap(),
            TensorLayout::ChannelsFirst
        );
        assert_eq!(
            "channels-last".parse::<TensorLayout>().unwrap(),
            TensorLayout::ChannelsLast
        );
    }

    #[test]
    fn invalid_layout_token_is_rejected() {
        assert!(matches!(
            "th".parse::<TensorLayout>(),
            Err(TaggerError::InvalidLayout(_))
        ));
    }
}
