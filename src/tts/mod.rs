pub mod native;
pub mod piper;
pub mod speaker;
pub mod voice;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::AppError;

pub use native::NativeEngine;
pub use piper::PiperEngine;
pub use speaker::MultiSpeakerEngine;
pub use voice::Voice;

/// Synthesis backend selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Native,
    Piper,
    MultiSpeaker,
}

impl EngineKind {
    /// Route on the model identifier: a case-insensitive substring check,
    /// first for the vocoder keyword, then the multi-speaker keyword.
    /// Anything else, including no identifier at all, uses the native
    /// engine.
    pub fn from_model_id(model_id: Option<&str>) -> Self {
        let Some(id) = model_id else {
            return EngineKind::Native;
        };

        let id = id.to_lowercase();
        if id.contains("piper") {
            EngineKind::Piper
        } else if id.contains("xtts") {
            EngineKind::MultiSpeaker
        } else {
            EngineKind::Native
        }
    }
}

const OUTPUT_POLL_ATTEMPTS: u32 = 5;
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct TtsService {
    models_dir: PathBuf,
    native: NativeEngine,
    // Loaded piper voices keyed by model path. Caches engines, never audio.
    engines: RwLock<HashMap<PathBuf, Arc<PiperEngine>>>,
    multi_speaker: Option<Arc<MultiSpeakerEngine>>,
}

impl TtsService {
    pub fn new(models_dir: PathBuf, multi_speaker: Option<Arc<MultiSpeakerEngine>>) -> Self {
        Self {
            models_dir,
            native: NativeEngine::new(),
            engines: RwLock::new(HashMap::new()),
            multi_speaker,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn multi_speaker(&self) -> Option<&Arc<MultiSpeakerEngine>> {
        self.multi_speaker.as_ref()
    }

    /// Synthesize one request to WAV bytes.
    ///
    /// Every request writes a fresh temp file which is polled for
    /// readiness and read back. Temp files are not cleaned up afterwards.
    pub fn speak(
        &self,
        text: &str,
        voice: Option<&str>,
        speed: f32,
        model_id: Option<&str>,
    ) -> Result<Vec<u8>, AppError> {
        let engine = EngineKind::from_model_id(model_id);
        tracing::info!(
            "Processing ({:?} | {}): {} chars",
            engine,
            model_id.unwrap_or("-"),
            text.len()
        );

        let out_path = self.temp_wav_path();

        match engine {
            EngineKind::Native => {
                self.native
                    .synthesize_to_file(text, voice, speed, &out_path)?;
            }
            EngineKind::Piper => {
                // Routing guarantees the identifier is present here.
                let model_id = model_id.unwrap_or_default();
                let piper = self.piper_engine(model_id)?;
                let wav = piper.synthesize(text)?;
                fs::write(&out_path, wav)?;
            }
            EngineKind::MultiSpeaker => {
                let Some(multi) = &self.multi_speaker else {
                    return Err(AppError::EngineUnavailable(
                        "no multi-speaker model loaded at startup".into(),
                    ));
                };
                let wav = multi.synthesize(text, voice)?;
                fs::write(&out_path, wav)?;
            }
        }

        wait_for_output(&out_path)?;
        Ok(fs::read(&out_path)?)
    }

    fn piper_engine(&self, model_id: &str) -> Result<Arc<PiperEngine>, AppError> {
        let voice = Voice::resolve(&self.models_dir, model_id)?;

        // Check cache
        {
            let engines = self.engines.read().unwrap();
            if let Some(engine) = engines.get(&voice.model_path) {
                return Ok(Arc::clone(engine));
            }
        }

        // Load new engine
        tracing::info!("Loading piper model: {}", voice.model_path.display());
        let engine = Arc::new(PiperEngine::new(&voice)?);

        // Cache it
        {
            let mut engines = self.engines.write().unwrap();
            engines.insert(voice.model_path.clone(), Arc::clone(&engine));
        }

        Ok(engine)
    }

    /// Per-request output path under the system temp directory.
    /// Uniqueness comes from pid + epoch milliseconds.
    fn temp_wav_path(&self) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("speech_{}_{}.wav", std::process::id(), millis))
    }
}

/// Some engines report completion before their output hits the disk; poll
/// briefly for a non-empty file before declaring failure.
fn wait_for_output(path: &Path) -> Result<(), AppError> {
    for _ in 0..OUTPUT_POLL_ATTEMPTS {
        if output_ready(path) {
            return Ok(());
        }
        std::thread::sleep(OUTPUT_POLL_INTERVAL);
    }

    if output_ready(path) {
        return Ok(());
    }

    Err(AppError::TtsError("Failed to generate audio file".into()))
}

fn output_ready(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
