use std::process::{Child, Command, Stdio};

use super::Speaker;
use crate::config::Language;

/// Speaking rate relative to the platform default.
const SPEECH_RATE: f32 = 0.9;

/// Speaks through the platform's command-line synthesizer.
#[derive(Default)]
pub struct SpeechEngine {
    current: Option<Child>,
}

impl SpeechEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaking(&mut self) -> bool {
        match self.current.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Speaker for SpeechEngine {
    fn speak(&mut self, text: &str, language: Language) {
        if text.trim().is_empty() {
            return;
        }
        self.stop();

        match system_tts(text, language) {
            Ok(child) => self.current = Some(child),
            Err(e) => log::error!("Speech failed: {}", e),
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.current.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for SpeechEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn system_tts(text: &str, language: Language) -> Result<Child, String> {
    #[cfg(target_os = "linux")]
    {
        Command::new("espeak")
            .args(espeak_args(text, language))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("espeak failed: {} (install with: apt install espeak)", e))
    }
    #[cfg(target_os = "macos")]
    {
        let words_per_minute = (175.0 * SPEECH_RATE) as u32;
        let mut cmd = Command::new("say");
        if language == Language::Ar {
            cmd.args(["-v", "Maged"]);
        }
        cmd.args(["-r", &words_per_minute.to_string()])
            .arg("--")
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("say failed: {}", e))
    }
    #[cfg(target_os = "windows")]
    {
        // Use PowerShell for TTS
        let script = format!(
            "Add-Type -AssemblyName System.Speech; $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
             try {{ $s.SelectVoiceByHints('NotSet', 'NotSet', 0, [System.Globalization.CultureInfo]'{}') }} catch {{}}; \
             $s.Rate = -1; $s.Speak('{}')",
            language.speech_locale(),
            text.replace('\'', "''")
        );
        Command::new("powershell")
            .args(["-Command", &script])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("PowerShell TTS failed: {}", e))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = (text, language, SPEECH_RATE);
        Err("No speech synthesizer on this platform".to_string())
    }
}

/// Labels come from the remote service, so `--` keeps them from being read as options.
#[cfg(target_os = "linux")]
fn espeak_args(text: &str, language: Language) -> Vec<String> {
    let voice = match language {
        Language::En => "en-us",
        Language::Ar => "ar",
    };
    let words_per_minute = (175.0 * SPEECH_RATE) as u32;
    vec![
        "-v".to_string(),
        voice.to_string(),
        "-s".to_string(),
        words_per_minute.to_string(),
        "--".to_string(),
        text.to_string(),
    ]
}
