use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::error::AppError;
use crate::tts::piper::{build_session, phonemes_to_ids, phonemize, samples_to_wav};
use crate::tts::voice::{self, VoiceConfig};

/// Fallback speaker when the requested one is absent from the model.
pub const DEFAULT_SPEAKER: &str = "p225";

/// One large multi-speaker model, loaded at startup and shared read-only
/// across requests.
pub struct MultiSpeakerEngine {
    session: Mutex<Session>,
    config: VoiceConfig,
    model_name: String,
    // Speaker names with their model-internal ids, in id order.
    speakers: Vec<(String, i64)>,
}

impl MultiSpeakerEngine {
    pub fn load(model_path: &Path) -> Result<Self, AppError> {
        let config = voice::load_config(model_path)?;
        let session = build_session(model_path)?;

        let mut speakers: Vec<(String, i64)> = config
            .speaker_id_map
            .iter()
            .map(|(name, sid)| (name.clone(), *sid))
            .collect();
        speakers.sort_by_key(|(_, sid)| *sid);

        if speakers.is_empty() {
            tracing::warn!(
                "Model {} has no speaker map; treating it as single-speaker",
                model_path.display()
            );
        }

        let model_name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.display().to_string());

        Ok(Self {
            session: Mutex::new(session),
            config,
            model_name,
            speakers,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Speaker identifiers known to the loaded model, in model id order.
    pub fn speakers(&self) -> Vec<String> {
        self.speakers.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn synthesize(&self, text: &str, speaker: Option<&str>) -> Result<Vec<u8>, AppError> {
        let sid = select_speaker(&self.speakers, speaker);

        let espeak_voice = self
            .config
            .espeak
            .as_ref()
            .map(|e| e.voice.as_str())
            .unwrap_or("en");
        let phonemes = phonemize(text, espeak_voice)?;
        let ids = phonemes_to_ids(&phonemes, &self.config.phoneme_id_map);
        let samples = self.infer(&ids, sid)?;

        samples_to_wav(&samples, self.config.audio.sample_rate)
    }

    fn infer(&self, phoneme_ids: &[i64], sid: Option<i64>) -> Result<Vec<f32>, AppError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();
        let inference = self.config.inference.clone().unwrap_or_default();

        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| AppError::TtsError(format!("Failed to create input tensor: {}", e)))?;

        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| AppError::TtsError(format!("Failed to create lengths tensor: {}", e)))?;

        let scales_value = Value::from_array((
            vec![3],
            vec![
                inference.noise_scale,
                inference.length_scale,
                inference.noise_w,
            ],
        ))
        .map_err(|e| AppError::TtsError(format!("Failed to create scales tensor: {}", e)))?;

        // Single-speaker models take no speaker id input.
        let mut session = self.session.lock().unwrap();
        let outputs = match sid {
            Some(sid) => {
                let sid_value = Value::from_array((vec![1], vec![sid])).map_err(|e| {
                    AppError::TtsError(format!("Failed to create speaker tensor: {}", e))
                })?;
                session.run(ort::inputs![
                    input_value,
                    lengths_value,
                    scales_value,
                    sid_value
                ])
            }
            None => session.run(ort::inputs![input_value, lengths_value, scales_value]),
        }
        .map_err(|e| AppError::TtsError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::TtsError("Missing output tensor".to_string()))?;

        let output_view = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::TtsError(format!("Failed to extract output tensor: {}", e)))?;

        let audio: Vec<f32> = output_view.1.iter().copied().collect();

        Ok(audio)
    }
}

/// Pick the model speaker id for a request: the exact requested name, else
/// the default speaker, else the first the model knows. Substitutions are
/// logged.
fn select_speaker(speakers: &[(String, i64)], requested: Option<&str>) -> Option<i64> {
    if speakers.is_empty() {
        return None;
    }

    if let Some(name) = requested {
        if let Some((_, sid)) = speakers.iter().find(|(n, _)| n == name) {
            return Some(*sid);
        }
    }

    let (fallback, sid) = speakers
        .iter()
        .find(|(n, _)| n == DEFAULT_SPEAKER)
        .unwrap_or(&speakers[0]);

    if let Some(name) = requested {
        tracing::warn!("Speaker '{}' not in model; using '{}'", name, fallback);
    }

    Some(*sid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaker_set() -> Vec<(String, i64)> {
        vec![
            ("p225".to_string(), 0),
            ("p226".to_string(), 1),
            ("p227".to_string(), 2),
        ]
    }

    #[test]
    fn exact_speaker_is_used() {
        assert_eq!(select_speaker(&speaker_set(), Some("p226")), Some(1));
    }

    #[test]
    fn unknown_speaker_falls_back_to_default() {
        assert_eq!(select_speaker(&speaker_set(), Some("p999")), Some(0));
    }

    #[test]
    fn missing_default_falls_back_to_first() {
        let speakers = vec![("alice".to_string(), 3), ("bob".to_string(), 7)];
        assert_eq!(select_speaker(&speakers, Some("carol")), Some(3));
    }

    #[test]
    fn no_request_uses_default_speaker() {
        assert_eq!(select_speaker(&speaker_set(), None), Some(0));
    }

    #[test]
    fn single_speaker_model_takes_no_sid() {
        assert_eq!(select_speaker(&[], Some("p225")), None);
    }
}
