use std::path::Path;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;

/// Default speaking rate of both `say` and `espeak-ng`, words per minute.
const BASELINE_RATE_WPM: f32 = 175.0;

#[derive(Debug, Clone)]
pub struct NativeVoice {
    pub id: String,
    pub name: String,
}

lazy_static! {
    // `say -v ?` lines: voice name, two or more spaces, locale, then a
    // `#`-prefixed sample sentence.
    static ref SAY_VOICE_LINE: Regex =
        Regex::new(r"^(?P<name>.+?)\s{2,}(?P<locale>[A-Za-z]{2,3}[_-][A-Za-z0-9_-]+)\s*#")
            .unwrap();
}

/// The operating system speech engine, driven through its command line
/// tool: `say` on macOS, `espeak-ng` everywhere else.
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate the voices the platform engine knows about.
    pub fn list_voices(&self) -> Result<Vec<NativeVoice>, AppError> {
        let output = if cfg!(target_os = "macos") {
            Command::new("say").args(["-v", "?"]).output()
        } else {
            Command::new("espeak-ng").arg("--voices").output()
        }
        .map_err(|e| {
            AppError::TtsError(format!(
                "Failed to list system voices (is the speech command installed?): {}",
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::TtsError(format!(
                "Voice listing failed: {}",
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(if cfg!(target_os = "macos") {
            parse_say_voices(&stdout)
        } else {
            parse_espeak_voices(&stdout)
        })
    }

    /// Synthesize text into `out_path` as WAV, blocking until the platform
    /// command exits.
    pub fn synthesize_to_file(
        &self,
        text: &str,
        voice: Option<&str>,
        speed: f32,
        out_path: &Path,
    ) -> Result<(), AppError> {
        let rate = ((BASELINE_RATE_WPM * speed).round() as u32).max(1);

        let resolved = voice.and_then(|requested| self.resolve_voice(requested));
        if let Some(v) = &resolved {
            tracing::debug!("Using native voice '{}'", v.name);
        }

        let mut cmd = if cfg!(target_os = "macos") {
            let mut c = Command::new("say");
            c.arg("-o")
                .arg(out_path)
                .arg("--data-format=LEI16@22050")
                .args(["-r", &rate.to_string()]);
            if let Some(v) = &resolved {
                c.args(["-v", &v.id]);
            }
            c.arg(text);
            c
        } else {
            let mut c = Command::new("espeak-ng");
            c.arg("-w")
                .arg(out_path)
                .args(["-s", &rate.to_string()]);
            if let Some(v) = &resolved {
                c.args(["-v", &v.id]);
            }
            c.arg(text);
            c
        };

        let output = cmd.output().map_err(|e| {
            AppError::TtsError(format!(
                "Failed to run the system speech command (is it installed?): {}",
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::TtsError(format!(
                "System speech command failed: {}",
                stderr
            )));
        }

        Ok(())
    }

    /// A requested voice that cannot be resolved falls back to the engine
    /// default, silently.
    fn resolve_voice(&self, requested: &str) -> Option<NativeVoice> {
        match self.list_voices() {
            Ok(voices) => match_voice(&voices, requested).cloned(),
            Err(e) => {
                tracing::warn!("Could not enumerate native voices: {}", e);
                None
            }
        }
    }
}

/// Case-insensitive substring match against voice id or display name;
/// first match wins.
pub fn match_voice<'a>(voices: &'a [NativeVoice], requested: &str) -> Option<&'a NativeVoice> {
    let wanted = requested.to_lowercase();
    voices.iter().find(|v| {
        v.id.to_lowercase().contains(&wanted) || v.name.to_lowercase().contains(&wanted)
    })
}

fn parse_say_voices(listing: &str) -> Vec<NativeVoice> {
    listing
        .lines()
        .filter_map(|line| {
            SAY_VOICE_LINE.captures(line).map(|cap| {
                let name = cap["name"].trim().to_string();
                NativeVoice {
                    id: name.clone(),
                    name,
                }
            })
        })
        .collect()
}

/// `espeak-ng --voices` is a fixed-width table; the second column is the
/// language code `-v` accepts, the fourth the display name.
fn parse_espeak_voices(listing: &str) -> Vec<NativeVoice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(NativeVoice {
                id: fields[1].to_string(),
                name: fields[3].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAY_LISTING: &str = "\
Alex                en_US    # Most people recognize me by my voice.
Bad News            en_US    # The light at the end of the tunnel is a train.
Amelie              fr_CA    # Bonjour, je m'appelle Amelie.
";

    const ESPEAK_LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af             --/M      Afrikaans          gmw/af
 5  en-gb          --/M      English_(Great_Britain) gmw/en
 5  fr-fr          --/M      French_(France)    roa/fr
";

    #[test]
    fn parses_say_listing() {
        let voices = parse_say_voices(SAY_LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "Alex");
        assert_eq!(voices[1].name, "Bad News");
    }

    #[test]
    fn parses_espeak_listing() {
        let voices = parse_espeak_voices(ESPEAK_LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].id, "en-gb");
        assert_eq!(voices[1].name, "English_(Great_Britain)");
    }

    #[test]
    fn matches_substring_of_name_case_insensitively() {
        let voices = parse_say_voices(SAY_LISTING);
        let found = match_voice(&voices, "bad news").unwrap();
        assert_eq!(found.name, "Bad News");
    }

    #[test]
    fn first_match_wins() {
        let voices = parse_say_voices(SAY_LISTING);
        // Every listed voice contains an "a"; Alex comes first.
        let found = match_voice(&voices, "A").unwrap();
        assert_eq!(found.name, "Alex");
    }

    #[test]
    fn unmatched_voice_yields_none() {
        let voices = parse_say_voices(SAY_LISTING);
        assert!(match_voice(&voices, "daniel").is_none());
    }
}
