use std::path::Path;

use hound::{SampleFormat, WavReader};
use ndarray::Array1;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{TaggerError, TaggerResult};

/// Decodes an audio file to a mono waveform at the target sample rate.
///
/// WAV files are decoded with hound. Every other container format needs the
/// `symphonia` feature; without it the call fails with a configuration
/// error naming the missing backend.
pub fn load_waveform<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> TaggerResult<Array1<f32>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let (samples, sample_rate) = if extension == "wav" {
        decode_wav(path)?
    } else {
        decode_other(path, &extension)?
    };

    if sample_rate == target_sample_rate {
        return Ok(Array1::from(samples));
    }
    resample(samples, sample_rate, target_sample_rate)
}

/// Reads a WAV file and mixes it down to mono f32 samples in [-1, 1].
fn decode_wav(path: &Path) -> TaggerResult<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_sample_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_sample_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

#[cfg(feature = "symphonia")]
fn decode_other(path: &Path, _extension: &str) -> TaggerResult<(Vec<f32>, u32)> {
    use symphonia::core::audio::{AudioBufferRef, Signal};
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::conv::FromSample;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    fn mix_down<S>(buf: &symphonia::core::audio::AudioBuffer<S>, out: &mut Vec<f32>)
    where
        S: symphonia::core::sample::Sample,
        f32: FromSample<S>,
    {
        let channels = buf.spec().channels.count();
        for frame in 0..buf.frames() {
            let mut acc = 0f32;
            for ch in 0..channels {
                acc += f32::from_sample(buf.chan(ch)[frame]);
            }
            out.push(acc / channels as f32);
        }
    }

    let src = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());
    let hint = Hint::new();
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| TaggerError::Resample(format!("failed to probe audio container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TaggerError::Resample("no decodable audio track".to_string()))?;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let track_id = track.id;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|e| TaggerError::Resample(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(AudioBufferRef::F32(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::F64(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::S8(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::S16(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::S24(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::S32(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::U8(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::U16(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::U24(buf)) => mix_down(buf.as_ref(), &mut samples),
            Ok(AudioBufferRef::U32(buf)) => mix_down(buf.as_ref(), &mut samples),
            Err(_) => break,
        }
    }

    Ok((samples, sample_rate))
}

#[cfg(not(feature = "symphonia"))]
fn decode_other(_path: &Path, extension: &str) -> TaggerResult<(Vec<f32>, u32)> {
    Err(TaggerError::DecoderMissing {
        extension: extension.to_string(),
    })
}

fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> TaggerResult<Array1<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let channel_data: Vec<Vec<f64>> = vec![samples.iter().map(|&s| s as f64).collect()];

    let mut resampler = SincFixedIn::<f64>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| TaggerError::Resample(e.to_string()))?;
    let resampled = resampler
        .process(&channel_data, None)
        .map_err(|e| TaggerError::Resample(e.to_string()))?;

    Ok(Array1::from_iter(resampled[0].iter().map(|&s| s as f32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_wav_is_mixed_down_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 12000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = load_waveform(&path, 12000).unwrap();
        assert_eq!(waveform.len(), 100);
        assert!(waveform.iter().all(|&v| v.abs() < 1e-4));
    }

    #[cfg(not(feature = "symphonia"))]
    #[test]
    fn non_wav_without_backend_is_a_configuration_fault() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not audio")
            .unwrap();

        let err = load_waveform(&path, 12000).unwrap_err();
        match &err {
            TaggerError::DecoderMissing { extension } => assert_eq!(extension, "mp3"),
            other => panic!("expected DecoderMissing, got {other}"),
        }
        assert!(err.to_string().contains("--features symphonia"));
    }
}
