//! Sentence-aligned text chunking for speech synthesis.

use tracing::warn;

/// Default maximum segment length in characters.
pub const DEFAULT_MAX_CHARS: usize = 250;

/// Substitutions applied before text is handed to a speech engine.
///
/// Applied in order; later rules see the output of earlier ones. See
/// [`normalize_for_speech`] for how a single rule matches.
pub const DEFAULT_SPEECH_RULES: &[(&str, &str)] = &[
    ("TV", "television"),
    ("PC", "personal computer"),
    ("...", "."),
    ("..", "."),
    ("\"", ""),
    ("\u{2019}", "'"),
    ("\u{201d}", ""),
    ("://", " "),
    ("\n", " "),
    (" -", ", "),
    ("*", ""),
    ("^", ""),
    ("\t", ""),
    ("  ", " "),
];

/// Apply substitution rules to `text`.
///
/// A pattern made only of letters and digits matches whole words, so `TV`
/// leaves `TVs` alone. Any other pattern matches anywhere. A rule whose
/// replacement does not contain its own pattern is applied until nothing
/// matches, which collapses runs such as several spaces in a row.
pub fn normalize_for_speech(text: &str, rules: &[(&str, &str)]) -> String {
    rules
        .iter()
        .filter(|(from, _)| !from.is_empty())
        .fold(text.to_string(), |acc, (from, to)| apply_rule(acc, from, to))
}

fn apply_rule(text: String, from: &str, to: &str) -> String {
    if from.chars().all(char::is_alphanumeric) {
        return replace_words(&text, from, to);
    }

    let mut text = text.replace(from, to);
    if to.contains(from) {
        return text;
    }
    // Replacements can form new matches across their edges; bound the passes.
    for _ in 0..text.len() {
        if !text.contains(from) {
            break;
        }
        text = text.replace(from, to);
    }
    text
}

fn replace_words(text: &str, word: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (start, _) in text.match_indices(word) {
        let end = start + word.len();
        let bounded_before = !text[..start].chars().next_back().is_some_and(char::is_alphanumeric);
        let bounded_after = !text[end..].chars().next().is_some_and(char::is_alphanumeric);
        if bounded_before && bounded_after {
            out.push_str(&text[last..start]);
            out.push_str(to);
            last = end;
        }
    }

    out.push_str(&text[last..]);
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

/// Splits text into sentence-like segments of bounded length.
///
/// Sentences end after a run of `.`, `?` or `!` followed by whitespace or
/// the end of the text; the terminator stays with its sentence. A sentence
/// longer than the cap is cut at the last whitespace within the cap, or at
/// the cap itself when there is none, and the remainder is examined again.
///
/// ```rust
/// use relay_core::TextChunker;
///
/// let chunks = TextChunker::new(250).split("Hi there! How are you? Fine.");
/// assert_eq!(chunks, vec!["Hi there!", "How are you?", "Fine."]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_chars: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl TextChunker {
    /// Create a chunker with the given cap (at least one character).
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// The configured cap.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into non-empty segments no longer than the cap.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut segments = split_sentences(text);

        let mut index = 0;
        while index < segments.len() {
            if segments[index].chars().count() > self.max_chars {
                let (head, tail) = cut_at_cap(&segments[index], self.max_chars);
                warn!(
                    "Segment starting {:?} exceeded {} characters and was split",
                    segments[index].chars().take(50).collect::<String>(),
                    self.max_chars
                );
                segments[index] = head;
                if !tail.is_empty() {
                    segments.insert(index + 1, tail);
                }
            }
            index += 1;
        }

        segments
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        while let Some(&(_, next)) = chars.peek() {
            if is_terminator(next) {
                chars.next();
            } else {
                break;
            }
        }

        let boundary = match chars.peek() {
            Some(&(i, next)) if next.is_whitespace() => i,
            Some(_) => continue,
            None => text.len(),
        };

        push_trimmed(&mut segments, &text[start..boundary]);
        start = boundary;
    }

    push_trimmed(&mut segments, &text[start..]);
    segments
}

fn push_trimmed(segments: &mut Vec<String>, segment: &str) {
    let segment = segment.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
}

/// Cut a trimmed segment longer than `max_chars` into a head within the cap
/// and the trimmed remainder.
fn cut_at_cap(segment: &str, max_chars: usize) -> (String, String) {
    // Byte offset of the first character past the cap.
    let hard_limit = segment
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(segment.len());

    let search_end = segment[hard_limit..]
        .chars()
        .next()
        .map(|c| hard_limit + c.len_utf8())
        .unwrap_or(hard_limit);

    let soft_limit = segment[..search_end]
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .last()
        .filter(|&i| i > 0);

    let cut = soft_limit.unwrap_or(hard_limit);
    let head = segment[..cut].trim_end().to_string();
    let tail = segment[cut..].trim_start().to_string();
    (head, tail)
}
