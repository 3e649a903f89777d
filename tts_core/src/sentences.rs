// Sentence segmentation for text that arrives in pieces (e.g. LLM tokens)

/// Sentences shorter than this are merged with the next one.
pub const DEFAULT_MIN_SENTENCE_LEN: usize = 8;

/// Tokens ending in a period that do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "etc.", "vs.", "e.g.", "i.e.", "a.m.", "p.m.", "Inc.",
    "Ltd.", "Corp.", "St.", "Jr.", "Sr.",
];

/// Incremental sentence splitter.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, so decimals like
/// `3.14` and trailing punctuation still being typed never split early.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    buffer: String,
    pending: String,
    min_len: usize,
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SENTENCE_LEN)
    }
}

impl SentenceSplitter {
    pub fn new(min_len: usize) -> Self {
        Self {
            buffer: String::new(),
            pending: String::new(),
            min_len,
        }
    }

    /// Feed a fragment, returning every sentence it completed.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let mut out = Vec::new();
        let mut start = 0;
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            let Some(&(_, next)) = chars.peek() else {
                break;
            };
            if !next.is_whitespace() {
                continue;
            }
            let end = i + c.len_utf8();
            if c == '.' && is_abbreviation(&self.buffer[start..end]) {
                continue;
            }

            let sentence = self.buffer[start..end].trim();
            if !sentence.is_empty() {
                if !self.pending.is_empty() {
                    self.pending.push(' ');
                }
                self.pending.push_str(sentence);
                if self.pending.chars().count() >= self.min_len {
                    out.push(std::mem::take(&mut self.pending));
                }
            }
            start = end;
        }
        self.buffer.drain(..start);
        out
    }

    /// Whatever is left once the input is complete, short or not.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        let mut last = std::mem::take(&mut self.pending);
        if !rest.is_empty() {
            if !last.is_empty() {
                last.push(' ');
            }
            last.push_str(rest);
        }
        (!last.is_empty()).then_some(last)
    }
}

/// Split a complete text in one go.
pub fn split_sentences(text: &str, min_len: usize) -> Vec<String> {
    let mut splitter = SentenceSplitter::new(min_len);
    let mut sentences = splitter.push(text);
    sentences.extend(splitter.finish());
    sentences
}

fn is_abbreviation(segment: &str) -> bool {
    let word = segment
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(['(', '"', '\'']);
    ABBREVIATIONS.iter().any(|a| a.eq_ignore_ascii_case(word))
}
