//! Extraction of a locator from free-form reasoning output.
//!
//! The reasoning service is untrusted: anything that does not look like a
//! single, well-formed locator is rejected rather than stored.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_LOCATOR_LEN: usize = 256;
const MAX_LOCATOR_WORDS: usize = 8;

static SELECTOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)SELECTOR:[ \t]*([^\r\n]*)").expect("selector pattern is valid")
});

/// Pull the locator out of a `SELECTOR: <locator>` reply.
///
/// The locator may follow the tag on the same line or sit in a code fence
/// opened on that line or the next.
pub fn extract_selector(reply: &str) -> Option<String> {
    let captures = SELECTOR_LINE.captures(reply)?;
    let tag_line = captures.get(1)?;
    let inline = tag_line.as_str().trim();

    let raw = if inline.is_empty() || is_fence(inline) {
        reply[tag_line.end()..]
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !is_fence(line))?
    } else {
        inline
    };
    let selector = raw
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim();

    is_plausible_locator(selector).then(|| selector.to_string())
}

/// An opening or closing fence, with or without a language tag.
fn is_fence(line: &str) -> bool {
    line.strip_prefix("```")
        .is_some_and(|tag| tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

pub fn is_plausible_locator(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.len() > MAX_LOCATOR_LEN {
        return false;
    }
    if candidate.contains(['\n', '\r', '{', '}', ';']) {
        return false;
    }
    // Prose ends like a sentence; CSS never does.
    if candidate.ends_with(['.', '!', '?', ',']) {
        return false;
    }
    if candidate.split_whitespace().count() > MAX_LOCATOR_WORDS {
        return false;
    }
    balanced(candidate)
}

fn balanced(candidate: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = candidate.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => stack.push(c),
            ')' if stack.pop() != Some('(') => return false,
            ']' if stack.pop() != Some('[') => return false,
            _ => {}
        }
    }
    quote.is_none() && stack.is_empty()
}
