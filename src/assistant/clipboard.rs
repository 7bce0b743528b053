use arboard::Clipboard;

use super::ClipboardWriter;

#[derive(Default)]
pub struct SystemClipboard;

impl ClipboardWriter for SystemClipboard {
    fn copy_text(&mut self, text: &str) -> Result<(), String> {
        let mut clipboard = Clipboard::new().map_err(|e| format!("Clipboard unavailable: {}", e))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| format!("Failed to copy: {}", e))
    }
}
