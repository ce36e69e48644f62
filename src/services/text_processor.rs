// Text Processing Service
// Markup stripping and sentence segmentation for submitted content

use regex::Regex;
use std::sync::OnceLock;

static TAG_RE: OnceLock<Regex> = OnceLock::new();

const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "mr.", "mrs.", "ms.", "dr.", "prof.", "fig.", "inc.",
    "ltd.", "st.", "jr.", "sr.", "approx.", "dept.", "mt.",
];

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// Remove tag-like spans (`<...>`) without validating the markup.
///
/// Unterminated `<` is left as text.
pub fn strip_markup(html: &str) -> String {
    tag_re().replace_all(html, "").into_owned()
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

fn is_closing(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '\u{201d}' | '\u{2019}' | ')' | ']')
}

fn trim_opening(token: &str) -> &str {
    token.trim_start_matches(|c: char| matches!(c, '(' | '[' | '"' | '\'' | '\u{201c}'))
}

/// First whitespace-delimited token at or after `from`, without opening quotes.
fn next_token(chars: &[char], from: usize) -> String {
    let rest: String = chars[from.min(chars.len())..]
        .iter()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| !c.is_whitespace())
        .collect();
    trim_opening(&rest).to_string()
}

// Single capital letter, except the pronoun "I".
fn is_initial(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_alphabetic() && c.is_uppercase() && c != 'I'
    )
}

fn ends_with_abbreviation(buffer: &str, next: &str) -> bool {
    let mut tokens = buffer.split_whitespace().rev();
    let token = match tokens.next() {
        Some(t) => trim_opening(t),
        None => return false,
    };
    let lower = token.to_lowercase();

    // "No. 5", but not a sentence ending in the word "no"
    if lower == "no." {
        return next.starts_with(|c: char| c.is_ascii_digit());
    }
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }
    if !is_initial(token) {
        return false;
    }

    // "J. Doe", "John F. Kennedy" hold together; "plan B. Then" splits.
    let continues_lowercase = next.starts_with(|c: char| c.is_lowercase());
    let in_name = match tokens.next().map(trim_opening) {
        None => true,
        Some(prev) => prev.starts_with(|c: char| c.is_uppercase()),
    };
    continues_lowercase || in_name
}

/// Split plain text into sentences.
///
/// Boundaries are runs of `.`, `!` or `?` (with trailing closing quotes or
/// brackets) followed by whitespace or end of input. Decimal numbers,
/// common abbreviations, "No." before a number and name initials do not end
/// a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut buffer = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        buffer.push(ch);

        if is_terminator(ch) {
            // Decimal numbers
            if ch == '.' && i > 0 && i + 1 < chars.len() {
                if chars[i - 1].is_ascii_digit() && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    continue;
                }
            }

            let mut last_terminator = ch;
            while i + 1 < chars.len() && (is_terminator(chars[i + 1]) || is_closing(chars[i + 1])) {
                i += 1;
                if is_terminator(chars[i]) {
                    last_terminator = chars[i];
                }
                buffer.push(chars[i]);
            }

            let at_boundary = i + 1 >= chars.len() || chars[i + 1].is_whitespace();
            let abbreviated =
                last_terminator == '.' && ends_with_abbreviation(&buffer, &next_token(&chars, i + 1));

            if at_boundary && !abbreviated {
                let sentence = buffer.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                buffer.clear();
            }
        }

        i += 1;
    }

    let remaining = buffer.trim();
    if !remaining.is_empty() {
        sentences.push(remaining.to_string());
    }

    sentences
}

/// Strip markup and segment the rest into sentences. Never fails.
pub fn preprocess(raw: &str) -> Vec<String> {
    split_sentences(&strip_markup(raw))
}
