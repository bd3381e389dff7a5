//! Splits a reply into speakable chunks for streaming synthesis

const SENTENCE_ENDINGS: [&str; 6] = ["。", "！", "？", ".", "!", "?"];
const BREATH_MARKERS: [&str; 4] = ["、", ",", "…", "・・・"];

/// Sentence-first splitter with a soft character budget per chunk
///
/// Whole sentences are packed together up to `chunk_size` characters.
/// Sentences longer than that are cut at breath marks (or hard at the
/// budget) and the pieces are packed the same way.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in split_after(text, &SENTENCE_ENDINGS, None) {
            if char_len(&sentence) > self.chunk_size {
                for piece in split_after(&sentence, &BREATH_MARKERS, Some(self.chunk_size)) {
                    self.pack(&mut chunks, &mut current, &piece);
                }
            } else {
                self.pack(&mut chunks, &mut current, &sentence);
            }
        }
        push_trimmed(&mut chunks, &current);

        chunks
    }

    fn pack(&self, chunks: &mut Vec<String>, current: &mut String, piece: &str) {
        if !current.is_empty() && char_len(current) + char_len(piece) > self.chunk_size {
            push_trimmed(chunks, current);
            current.clear();
        }
        current.push_str(piece);
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Cut after every delimiter, and after `limit` characters when given
fn split_after(text: &str, delimiters: &[&str], limit: Option<usize>) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        let at_delimiter = delimiters.iter().any(|d| current.ends_with(d));
        if at_delimiter || limit.is_some_and(|limit| count >= limit) {
            if !current.trim().is_empty() {
                parts.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            count = 0;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
