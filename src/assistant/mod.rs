pub mod clipboard;
pub mod tts;

use crate::config::Language;

/// Text-to-speech capability. Fire-and-forget: a new utterance cuts off the
/// previous one.
pub trait Speaker: Send {
    fn speak(&mut self, text: &str, language: Language);
    fn stop(&mut self);
}

pub trait ClipboardWriter: Send {
    fn copy_text(&mut self, text: &str) -> Result<(), String>;
}
