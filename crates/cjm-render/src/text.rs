//! Label fitting for block and marker captions.
//!
//! The editors measure text themselves; we only need a deterministic estimate good enough to
//! pick a font size and line breaks that keep a caption inside its shape.

use unicode_width::UnicodeWidthStr;

pub const MIN_FONT_SIZE: f64 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font_size: 20.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub line_count: usize,
}

pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics;

    /// Display columns that fit into `width` at `font_size`; at least one.
    fn columns_for(&self, width: f64, font_size: f64) -> usize;
}

/// Fixed-advance estimate: every display column is `char_width_factor` em wide and every
/// line `line_height_factor` em tall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeterministicTextMeasurer {
    pub char_width_factor: f64,
    pub line_height_factor: f64,
}

impl Default for DeterministicTextMeasurer {
    fn default() -> Self {
        Self {
            char_width_factor: 0.6,
            line_height_factor: 1.35,
        }
    }
}

impl TextMeasurer for DeterministicTextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics {
        let font_size = style.font_size.max(1.0);
        let lines: Vec<&str> = text.split('\n').collect();
        let widest = lines.iter().map(|l| l.width()).max().unwrap_or(0);
        TextMetrics {
            width: widest as f64 * font_size * self.char_width_factor,
            height: lines.len() as f64 * font_size * self.line_height_factor,
            line_count: lines.len(),
        }
    }

    fn columns_for(&self, width: f64, font_size: f64) -> usize {
        let per_column = font_size.max(1.0) * self.char_width_factor;
        ((width / per_column).floor() as usize).max(1)
    }
}

/// A caption after fitting: wrapped text, chosen size and the height it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub text: String,
    pub font_size: f64,
    pub height: f64,
}

/// Greedy word wrap to `max_columns` display columns. Words longer than a line are split
/// into chunks.
pub fn wrap_words(text: &str, max_columns: usize) -> Vec<String> {
    let max_columns = max_columns.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current.is_empty() {
            if word_width <= max_columns {
                current.push_str(word);
                continue;
            }
            let mut chunks = chunk_by_width(word, max_columns);
            if let Some(last) = chunks.pop() {
                lines.extend(chunks);
                current = last;
            }
            continue;
        }
        if current.width() + 1 + word_width <= max_columns {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            if word_width <= max_columns {
                current.push_str(word);
            } else {
                let mut chunks = chunk_by_width(word, max_columns);
                if let Some(last) = chunks.pop() {
                    lines.extend(chunks);
                    current = last;
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn chunk_by_width(word: &str, max_columns: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut cur_width = 0usize;
    for ch in word.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if cur_width + w > max_columns && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
            cur_width = 0;
        }
        cur.push(ch);
        cur_width += w;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Steps the font size down from `max_size` to `min_size` until the wrapped caption fits
/// `max_height`. At `min_size` the caption is returned wrapped even if it still overflows.
pub fn fit_text(
    measurer: &dyn TextMeasurer,
    text: &str,
    max_width: f64,
    max_height: f64,
    max_size: f64,
    min_size: f64,
) -> FittedText {
    let min_size = min_size.max(1.0);
    let max_size = max_size.max(min_size);
    if text.trim().is_empty() {
        let height = measurer
            .measure("", &TextStyle { font_size: max_size })
            .height;
        return FittedText {
            text: text.to_string(),
            font_size: max_size,
            height: height.min(max_height),
        };
    }

    let attempt = |font_size: f64| -> FittedText {
        let lines = wrap_words(text, measurer.columns_for(max_width, font_size));
        let wrapped = lines.join("\n");
        let height = measurer.measure(&wrapped, &TextStyle { font_size }).height;
        FittedText {
            text: wrapped,
            font_size,
            height,
        }
    };

    let mut size = max_size.floor();
    while size >= min_size {
        let fitted = attempt(size);
        if fitted.height <= max_height {
            return fitted;
        }
        size -= 1.0;
    }
    let mut fitted = attempt(min_size);
    fitted.height = fitted.height.min(max_height);
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_short_words_together() {
        assert_eq!(wrap_words("check the form", 9), vec!["check the", "form"]);
        assert_eq!(wrap_words("  spaced   out ", 20), vec!["spaced out"]);
    }

    #[test]
    fn wrap_chunks_long_words() {
        assert_eq!(
            wrap_words("abcdefghij xy", 4),
            vec!["abcd", "efgh", "ij", "xy"]
        );
    }

    #[test]
    fn short_captions_keep_the_largest_size() {
        let m = DeterministicTextMeasurer::default();
        let fitted = fit_text(&m, "a", 236.0, 96.0, 20.0, MIN_FONT_SIZE);
        assert_eq!(fitted.font_size, 20.0);
        assert_eq!(fitted.text, "a");
        assert_eq!(fitted.height, 27.0);
    }

    #[test]
    fn long_captions_step_down() {
        let m = DeterministicTextMeasurer::default();
        let text = "Collect customer identity documents and verify them against the registry";
        let fitted = fit_text(&m, text, 236.0, 96.0, 20.0, MIN_FONT_SIZE);
        assert!(fitted.font_size < 20.0);
        assert!(fitted.font_size >= MIN_FONT_SIZE);
        assert!(fitted.height <= 96.0);
        assert_eq!(fitted.text.replace('\n', " "), text);
    }

    #[test]
    fn overflowing_captions_stop_at_the_minimum() {
        let m = DeterministicTextMeasurer::default();
        let text = "word ".repeat(200);
        let fitted = fit_text(&m, &text, 100.0, 24.0, 20.0, MIN_FONT_SIZE);
        assert_eq!(fitted.font_size, MIN_FONT_SIZE);
        assert_eq!(fitted.height, 24.0);
    }
}
