use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use candle_core::Device;
use clap::Parser;

use music_tagger_crnn::preprocessing::spectrogram;
use music_tagger_crnn::{
    MusicTagger, PredictionDecoder, TaggerConfig, TagVocabulary, TensorLayout, WeightSource,
};

/// Predict music tags for an audio file with the CRNN auto-tagger.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Audio file to tag (WAV out of the box; other formats need the
    /// `symphonia` feature)
    audio: PathBuf,

    /// Number of tags to report, within [0, 50]
    #[arg(long, default_value_t = 5)]
    top_n: usize,

    /// Tensor layout convention: `channels-first` or `channels-last`
    #[arg(long, default_value = "channels-first", value_parser = TensorLayout::from_str)]
    layout: TensorLayout,

    /// Weight source: `msd` (pretrained) or `random`
    #[arg(long, default_value = "msd", value_parser = WeightSource::from_str)]
    weights: WeightSource,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let spectrogram = spectrogram::extract(&args.audio, args.layout)?;

    let model = MusicTagger::new(
        TaggerConfig {
            weights: args.weights,
            include_top: true,
            layout: args.layout,
        },
        Device::Cpu,
    )?;
    let predictions = model.predict(&[spectrogram])?;

    let decoder = PredictionDecoder::new(TagVocabulary::last_fm());
    let ranked = decoder.decode_batch(&predictions, args.top_n)?;

    println!("{}:", args.audio.display());
    for (tag, score) in &ranked[0] {
        println!("  {score:.4}  {tag}");
    }

    Ok(())
}
