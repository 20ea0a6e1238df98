//! Text normalization for the per-user classifier.
//!
//! Accepts either a full RFC 5322 message (headers + MIME body) or a bare
//! text fragment and produces a space-joined sequence of lowercase content
//! tokens. Pure and deterministic for a fixed keep-list.

use mailparse::{DispositionType, ParsedMail};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Stop-words that carry classification signal and are never dropped by default.
pub const DEFAULT_KEEP_WORDS: &[&str] = &["won", "not", "no", "win"];

/// Standard English stop-word list (NLTK corpus).
const ENGLISH_STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're",
    "you've", "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he",
    "him", "his", "himself", "she", "she's", "her", "hers", "herself", "it", "it's",
    "its", "itself", "they", "them", "their", "theirs", "themselves", "what",
    "which", "who", "whom", "this", "that", "that'll", "these", "those", "am", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "having",
    "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about",
    "against", "between", "into", "through", "during", "before", "after", "above",
    "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some",
    "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
    "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn",
    "couldn't", "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn",
    "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn", "mightn't",
    "mustn", "mustn't", "needn", "needn't", "shan", "shan't", "shouldn",
    "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http\S+|www\S+|https\S+").expect("static regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S*@\S*\s?").expect("static regex"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

// First line of a message: an mbox envelope line or an RFC 5322 field name.
static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(From |[\x21-\x39\x3B-\x7E]+:)").expect("static regex"));

static DEFAULT: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// Normalize `raw` with the default keep-list.
pub fn clean(raw: &str) -> String {
    DEFAULT.clean(raw)
}

/// Stop-word filter plus cleaning pipeline.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stop_words: HashSet<&'static str>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_WORDS.iter().copied())
    }
}

impl Normalizer {
    /// Build a normalizer whose stop-word set excludes every word in `keep`.
    pub fn new<I, S>(keep: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: HashSet<String> = keep
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        let stop_words = ENGLISH_STOP_WORDS
            .iter()
            .copied()
            .filter(|w| !keep.contains(*w))
            .collect();
        Self { stop_words }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn clean(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let body = extract_body(raw);
        let scrubbed = scrub(body.as_deref().unwrap_or(raw));

        scrubbed
            .split_whitespace()
            .filter(|tok| tok.chars().count() > 2 && !self.stop_words.contains(*tok))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Pull the plain-text body out of a structured message.
///
/// Returns `None` when the input does not look like a message, fails to
/// parse, or has no usable body; the caller then cleans the raw input.
fn extract_body(raw: &str) -> Option<String> {
    let first_line = raw.lines().next().unwrap_or("");
    if !HEADER_LINE_RE.is_match(first_line) {
        return None;
    }

    let mail = mailparse::parse_mail(raw.as_bytes()).ok()?;
    let body = if mail.ctype.mimetype.starts_with("multipart/") {
        first_plain_part(&mail)?.get_body().ok()?
    } else {
        mail.get_body().ok()?
    };

    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}

/// Depth-first search for the first inline `text/plain` part.
fn first_plain_part<'a, 'b>(part: &'b ParsedMail<'a>) -> Option<&'b ParsedMail<'a>> {
    let is_attachment = matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment
    );
    if part.ctype.mimetype == "text/plain" && !is_attachment {
        return Some(part);
    }
    part.subparts.iter().find_map(|sub| first_plain_part(sub))
}

/// Run the string-level cleanup until it reaches a fixed point.
///
/// A single pass is not enough: removing punctuation can join fragments
/// into a new `http...` token that the URL step would have removed.
fn scrub(text: &str) -> String {
    let mut current = scrub_once(text);
    loop {
        let next = scrub_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn scrub_once(text: &str) -> String {
    let lower = text.to_lowercase();
    let no_urls = URL_RE.replace_all(&lower, "");
    let no_emails = EMAIL_RE.replace_all(&no_urls, "");
    let no_digits = DIGITS_RE.replace_all(&no_emails, "");
    let words_only = NON_WORD_RE.replace_all(&no_digits, "");
    WHITESPACE_RE.replace_all(&words_only, " ").trim().to_string()
}
