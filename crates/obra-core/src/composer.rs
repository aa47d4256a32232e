/// The message input field: text plus a character-based cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    text: String,
    cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replace the contents and put the cursor at the end.
    pub fn set(&mut self, text: &str) {
        self.text = text.to_string();
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        let char_count = self.text.chars().count();
        if self.cursor < char_count {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        let char_count = self.text.chars().count();
        self.cursor = (self.cursor + 1).min(char_count);
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_backspace_multibyte() {
        let mut composer = Composer::new();
        for c in "añob".chars() {
            composer.insert(c);
        }
        composer.move_left();
        composer.backspace();
        assert_eq!(composer.text(), "añb");
        assert_eq!(composer.cursor(), 2);
    }

    #[test]
    fn test_delete_at_cursor() {
        let mut composer = Composer::new();
        composer.set("budget");
        composer.home();
        composer.delete();
        assert_eq!(composer.text(), "udget");
        composer.end();
        composer.delete();
        assert_eq!(composer.text(), "udget");
    }

    #[test]
    fn test_cursor_bounds() {
        let mut composer = Composer::new();
        composer.move_left();
        assert_eq!(composer.cursor(), 0);
        composer.set("ab");
        composer.move_right();
        assert_eq!(composer.cursor(), 2);
    }

    #[test]
    fn test_blank() {
        let mut composer = Composer::new();
        composer.set("   \t ");
        assert!(composer.is_blank());
        composer.clear();
        assert!(composer.is_blank());
        assert_eq!(composer.cursor(), 0);
    }
}
