//! Pretrained weight artifacts.
//!
//! Weights are published as safetensors files, one per tensor layout
//! convention, downloaded on first use and cached by filename under
//! `~/.cache/music-tagger-crnn/weights/`. Restoration is a merge keyed by
//! layer identifier: entries missing on either side are logged, not fatal,
//! so the architecture can evolve without breaking weight files.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;

use crate::error::{TaggerError, TaggerResult};
use crate::TensorLayout;

const CHANNELS_FIRST_URL: &str = "https://github.com/keunwoochoi/music-auto_tagging-keras/releases/download/v0.3/music_tagger_crnn_channels_first.safetensors";
const CHANNELS_LAST_URL: &str = "https://github.com/keunwoochoi/music-auto_tagging-keras/releases/download/v0.3/music_tagger_crnn_channels_last.safetensors";

fn artifact(layout: TensorLayout) -> (&'static str, &'static str) {
    match layout {
        TensorLayout::ChannelsFirst => (
            "music_tagger_crnn_channels_first.safetensors",
            CHANNELS_FIRST_URL,
        ),
        TensorLayout::ChannelsLast => (
            "music_tagger_crnn_channels_last.safetensors",
            CHANNELS_LAST_URL,
        ),
    }
}

/// Downloads and caches weight artifacts.
pub struct WeightCache {
    cache_dir: PathBuf,
}

impl WeightCache {
    /// Create with the default cache directory:
    /// `~/.cache/music-tagger-crnn/weights/`.
    pub fn new() -> TaggerResult<Self> {
        let base = dirs::cache_dir().ok_or(TaggerError::NoCacheDir)?;
        Ok(Self {
            cache_dir: base.join("music-tagger-crnn").join("weights"),
        })
    }

    /// Create with a custom cache directory (for testing).
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Path to the weight file for a layout, downloading it if absent.
    pub fn ensure(&self, layout: TensorLayout) -> TaggerResult<PathBuf> {
        let (filename, url) = artifact(layout);
        let path = self.cache_dir.join(filename);
        if path.exists() {
            log::info!("weights found at {path:?}");
            return Ok(path);
        }

        log::info!("downloading weights from {url}");
        self.download_file(url, &path)?;
        Ok(path)
    }

    /// Download a file from URL to target path with atomic rename.
    fn download_file(&self, url: &str, target_path: &Path) -> TaggerResult<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let temp_path = target_path.with_extension("tmp");

        let fetch_err = |reason: String| TaggerError::WeightFetch {
            url: url.to_string(),
            reason,
        };

        let response = ureq::get(url).call().map_err(|e| fetch_err(e.to_string()))?;
        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut file = fs::File::create(&temp_path)?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded: u64 = 0;
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| fetch_err(e.to_string()))?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
        }
        file.flush()?;
        drop(file);

        if let Some(expected) = content_length {
            if downloaded != expected {
                fs::remove_file(&temp_path).ok();
                return Err(fetch_err(format!(
                    "download incomplete: expected {expected} bytes, got {downloaded}"
                )));
            }
        }

        fs::rename(&temp_path, target_path)?;
        Ok(())
    }
}

/// What a named merge actually restored.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Variables whose values were restored from the file.
    pub loaded: Vec<String>,
    /// Model variables with no entry in the file (left at their current
    /// values).
    pub missing: Vec<String>,
    /// File entries with no matching model variable.
    pub extra: Vec<String>,
}

/// Merges a safetensors file into a model's variables by layer identifier.
///
/// Unlike a strict positional restore, names present on only one side are
/// tolerated and logged, so truncated or extended variants of the
/// architecture still load the layers they share with the weight file.
pub fn load_named_weights<P: AsRef<Path>>(
    varmap: &VarMap,
    path: P,
    device: &Device,
) -> TaggerResult<MergeReport> {
    let tensors: HashMap<String, candle_core::Tensor> =
        candle_core::safetensors::load(path.as_ref(), device)?;

    let mut report = MergeReport::default();
    {
        let data = varmap.data().lock().unwrap();
        for (name, var) in data.iter() {
            match tensors.get(name) {
                Some(tensor) => {
                    var.set(tensor)?;
                    report.loaded.push(name.clone());
                }
                None => report.missing.push(name.clone()),
            }
        }
        for name in tensors.keys() {
            if !data.contains_key(name) {
                report.extra.push(name.clone());
            }
        }
    }

    log::info!(
        "restored {} tensors from {:?}",
        report.loaded.len(),
        path.as_ref()
    );
    for name in &report.missing {
        log::warn!("no stored weights for layer `{name}`, keeping initialization");
    }
    for name in &report.extra {
        log::warn!("stored weights for unknown layer `{name}` ignored");
    }

    Ok(report)
}
