//! Splitting long replies into platform-sized messages.
//!
//! Text is split along the coarsest structure that fits: paragraphs first,
//! then lines, then sentences, and finally raw slices at whitespace. Each
//! level is only engaged for a unit that is itself over the limit, so a
//! reply made of short paragraphs never gets split mid-paragraph.
//!
//! Chunks rejoin losslessly with the separator of the level that produced
//! them (`"\n\n"`, `"\n"`, `" "`), except for trimmed surrounding
//! whitespace and collapsed runs of blank lines.

/// Reference platform message limit, in characters.
pub const DEFAULT_MAX_CHARS: usize = 2000;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const LINE_SEPARATOR: &str = "\n";
const SENTENCE_SEPARATOR: &str = " ";

/// One message of a delivery, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    /// Position within the delivery (0-based).
    pub index: usize,

    /// Text content.
    pub text: String,

    /// Whether this is the first chunk.
    pub is_first: bool,

    /// Whether this is the final chunk (the one that carries embeds and attachments).
    pub is_last: bool,
}

impl MessageChunk {
    /// Number ordered texts as chunks.
    pub fn sequence(texts: Vec<String>) -> Vec<MessageChunk> {
        let total = texts.len();
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| MessageChunk {
                index,
                text,
                is_first: index == 0,
                is_last: index + 1 == total,
            })
            .collect()
    }
}

/// Splits text into chunks no longer than a character limit.
#[derive(Debug, Clone, Copy)]
pub struct MessageChunker {
    max_chars: usize,
}

impl Default for MessageChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl MessageChunker {
    /// Create a chunker. A zero limit is treated as one character.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// The character limit.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into ordered chunks.
    ///
    /// Always returns at least one element; empty input yields `[""]`.
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if char_len(trimmed) <= self.max_chars {
            return vec![trimmed.to_string()];
        }

        // Line endings only matter once boundaries are searched.
        let normalized = trimmed.replace("\r\n", "\n");
        let text = normalized.as_str();

        let chunks = self.pack(&paragraphs(text), PARAGRAPH_SEPARATOR, Self::split_paragraph);
        if chunks.is_empty() {
            vec![String::new()]
        } else {
            chunks
        }
    }

    /// Append `suffix` on its own line, then split.
    ///
    /// The suffix counts toward the limit. When the combined text overflows,
    /// ordinary splitting applies and the suffix lands wherever it falls.
    pub fn prepare_and_split(&self, text: &str, suffix: Option<&str>) -> Vec<String> {
        match suffix.map(str::trim).filter(|s| !s.is_empty()) {
            Some(suffix) => self.split(&format!("{}\n{}", text.trim_end(), suffix)),
            None => self.split(text),
        }
    }

    /// Split and number chunks in one step.
    pub fn chunks(&self, text: &str, suffix: Option<&str>) -> Vec<MessageChunk> {
        MessageChunk::sequence(self.prepare_and_split(text, suffix))
    }

    fn split_paragraph(&self, paragraph: &str) -> Vec<String> {
        let lines: Vec<&str> = paragraph
            .split('\n')
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect();
        self.pack(&lines, LINE_SEPARATOR, Self::split_line)
    }

    fn split_line(&self, line: &str) -> Vec<String> {
        self.pack(&sentences(line), SENTENCE_SEPARATOR, Self::split_raw)
    }

    /// Cut at the last whitespace inside the limit, or hard-cut at the limit.
    fn split_raw(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = text.trim();

        while char_len(rest) > self.max_chars {
            let window_end = rest
                .char_indices()
                .nth(self.max_chars)
                .map(|(idx, _)| idx)
                .unwrap_or(rest.len());
            let window = &rest[..window_end];

            let cut = if rest[window_end..].starts_with(char::is_whitespace) {
                Some(window_end)
            } else {
                window.rfind(char::is_whitespace).filter(|&idx| idx > 0)
            };

            match cut {
                Some(idx) => {
                    out.push(rest[..idx].trim_end().to_string());
                    rest = rest[idx..].trim_start();
                }
                None => {
                    out.push(window.to_string());
                    rest = &rest[window_end..];
                }
            }
        }

        if !rest.is_empty() {
            out.push(rest.to_string());
        }
        out
    }

    /// Greedily join units with `separator`, handing oversized units to `split_oversized`.
    fn pack<F>(&self, units: &[&str], separator: &str, split_oversized: F) -> Vec<String>
    where
        F: Fn(&Self, &str) -> Vec<String>,
    {
        let separator_len = char_len(separator);
        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for &unit in units {
            let unit_len = char_len(unit);

            if unit_len > self.max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                out.extend(split_oversized(self, unit));
                continue;
            }

            if current.is_empty() {
                current.push_str(unit);
                current_len = unit_len;
            } else if current_len + separator_len + unit_len > self.max_chars {
                out.push(std::mem::replace(&mut current, unit.to_string()));
                current_len = unit_len;
            } else {
                current.push_str(separator);
                current.push_str(unit);
                current_len += separator_len + unit_len;
            }
        }

        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Blank-line separated blocks, trimmed, blank runs collapsed.
fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    let mut offset = 0usize;

    for line in text.split('\n') {
        let line_end = offset + line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push(text[s..end].trim());
            }
        } else {
            if start.is_none() {
                start = Some(offset);
            }
            end = line_end;
        }
        offset = line_end + 1;
    }

    if let Some(s) = start {
        out.push(text[s..end].trim());
    }
    out
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace.
fn sentences(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut iter = line.char_indices().peekable();

    while let Some((_, c)) = iter.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = iter.peek() {
            if next.is_whitespace() {
                let sentence = line[start..next_idx].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = next_idx;
            }
        }
    }

    let tail = line[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
