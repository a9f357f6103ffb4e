use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub speaker_id_map: HashMap<String, i64>,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

#[derive(Debug)]
pub struct Voice {
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    /// Resolve a client-supplied model identifier to a model file and its
    /// sidecar config.
    pub fn resolve(models_dir: &Path, model_id: &str) -> Result<Self, AppError> {
        let model_path = resolve_model_file(models_dir, model_id)?;
        let config = load_config(&model_path)?;

        Ok(Self { config, model_path })
    }
}

/// Locate the `.onnx` file for a model identifier.
///
/// Resolution order: the exact `<id>.onnx` filename, then the first
/// directory entry whose name contains the identifier or whose stem the
/// identifier contains (case-insensitive, either direction). Nothing
/// matching is a not-found error carrying the directory listing.
pub fn resolve_model_file(models_dir: &Path, model_id: &str) -> Result<PathBuf, AppError> {
    let direct = models_dir.join(format!("{}.onnx", model_id));
    if direct.exists() {
        tracing::debug!("Direct model path match: {}", direct.display());
        return Ok(direct);
    }

    let wanted = model_id.to_lowercase();
    let mut listing = Vec::new();

    if models_dir.exists() {
        tracing::debug!("Direct match failed, scanning {}", models_dir.display());

        let mut entries = fs::read_dir(models_dir)?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            listing.push(name.clone());

            let lower = name.to_lowercase();
            if !lower.ends_with(".onnx") {
                continue;
            }

            let stem = lower.trim_end_matches(".onnx");
            if lower.contains(&wanted) || wanted.contains(stem) {
                tracing::debug!("Found model via scan: {}", name);
                return Ok(models_dir.join(&name));
            }
        }
    }

    Err(AppError::ModelNotFound {
        model_id: model_id.to_string(),
        models_dir: models_dir.display().to_string(),
        listing: listing.join(", "),
    })
}

/// Read the `<model>.onnx.json` sidecar. A resolved model without one is a
/// broken installation, reported as a generation failure rather than
/// not-found.
pub fn load_config(model_path: &Path) -> Result<VoiceConfig, AppError> {
    let config_path = model_path.with_extension("onnx.json");
    if !config_path.exists() {
        return Err(AppError::TtsError(format!(
            "Voice config not found: {}",
            config_path.display()
        )));
    }

    let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "speech-gateway-voice-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn resolves_exact_filename() {
        let dir = scratch_dir("exact");
        fs::write(dir.join("en_US-joy-medium.onnx"), b"model").unwrap();

        let path = resolve_model_file(&dir, "en_US-joy-medium").unwrap();
        assert_eq!(path, dir.join("en_US-joy-medium.onnx"));
    }

    #[test]
    fn resolves_stem_contained_in_identifier() {
        let dir = scratch_dir("stem");
        fs::write(dir.join("en_us-joy-medium.onnx"), b"model").unwrap();

        let path = resolve_model_file(&dir, "piper-en_us-joy-medium").unwrap();
        assert_eq!(path, dir.join("en_us-joy-medium.onnx"));
    }

    #[test]
    fn resolves_identifier_contained_in_filename() {
        let dir = scratch_dir("contained");
        fs::write(dir.join("piper-alba-high.onnx"), b"model").unwrap();

        let path = resolve_model_file(&dir, "alba").unwrap();
        assert_eq!(path, dir.join("piper-alba-high.onnx"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let dir = scratch_dir("case");
        fs::write(dir.join("EN_GB-Alba-Medium.onnx"), b"model").unwrap();

        let path = resolve_model_file(&dir, "piper-en_gb-alba-medium").unwrap();
        assert_eq!(path, dir.join("EN_GB-Alba-Medium.onnx"));
    }

    #[test]
    fn missing_model_error_lists_directory() {
        let dir = scratch_dir("missing");
        fs::write(dir.join("readme.txt"), b"no models here").unwrap();

        let err = resolve_model_file(&dir, "piper-nope").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("piper-nope"));
        assert!(message.contains("readme.txt"));
    }

    #[test]
    fn non_onnx_files_never_match() {
        let dir = scratch_dir("non-onnx");
        fs::write(dir.join("piper-alba.txt"), b"not a model").unwrap();

        assert!(resolve_model_file(&dir, "piper-alba").is_err());
    }
}
