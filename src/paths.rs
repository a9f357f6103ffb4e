use std::path::PathBuf;

/// Directory holding downloadable voice model files.
///
/// macOS keeps per-app data under Application Support; everywhere else the
/// server falls back to a `models` directory under the working directory.
pub fn default_models_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support/speech-gateway/models");
        }
    }

    std::env::current_dir()
        .map(|cwd| cwd.join("models"))
        .unwrap_or_else(|_| PathBuf::from("models"))
}
