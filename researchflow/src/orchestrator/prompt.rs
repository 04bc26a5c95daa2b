//! Turns a free-text research prompt into a [`ResearchRequest`].
//!
//! Parsing is shallow: polite lead-ins and research verbs are
//! stripped from the front, a trailing publish instruction is stripped from
//! the back, and the platform named in that instruction (if any) becomes the
//! requested publish target. Only the last instruction that follows a
//! separator ("," "." "and" "then") counts, so verbs inside the topic stay
//! part of it.

use regex::Regex;
use std::sync::LazyLock;

use crate::core::{PublishTargetKind, ResearchRequest};
use crate::errors::PromptError;

const PLATFORMS: &str = r"google\s*docs?|gdocs|share\s*point|confluence|pdf";

struct PromptPatterns {
    /// "publish it to Confluence", from the verb to the end.
    publish_clause: Regex,
    /// ", and then " right before a publish clause.
    separator: Regex,
    /// "... as a PDF", "... in Google Docs" at the very end.
    target_phrase: Regex,
    /// "Please research", "Can you look into", "Tell me about" at the start.
    lead_in: Regex,
    platform: Regex,
}

impl PromptPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            publish_clause: Regex::new(&format!(
                r"(?i)\b(?:publish|save|export|upload|post|put|store|send|write)\s.*?\b(?:{PLATFORMS})\b.*$"
            ))?,
            separator: Regex::new(r"(?i)(?:[,;:.!?-]\s*|\s+(?:and|then)\s+)(?:(?:and|then)\s+)*$")?,
            target_phrase: Regex::new(&format!(
                r"(?i)[\s,;:.!?-]*\b(?:to|as|in|on|into|via)\s+(?:(?:an?|the|my|our|new|local)\s+)*(?:{PLATFORMS})(?:\s+(?:document|doc|file|page|space|site))?[\s.!?]*$"
            ))?,
            lead_in: Regex::new(concat!(
                r"(?i)^\s*(?:(?:please|kindly|can\s+you|could\s+you|would\s+you|help\s+me|",
                r"i\s+want\s+you\s+to|i'?d\s+like\s+you\s+to|i\s+would\s+like\s+you\s+to)[\s,]+)*",
                r"(?:(?:(?:do|conduct)\s+(?:some\s+)?)?research(?:\s+(?:on|about|into|the\s+topic\s+of))?|",
                r"look\s+up|look\s+into|find\s+out\s+about|find\s+(?:information|info)\s+(?:on|about)|",
                r"investigate|tell\s+me\s+about|summari[sz]e|explore|",
                r"(?:write|save|create|prepare|produce|compile)\s+(?:an?\s+)?",
                r"(?:report|summary|article|brief|document)\s+(?:on|about))\b[\s:,]*",
            ))?,
            platform: Regex::new(&format!(r"(?i)\b(?:{PLATFORMS})\b"))?,
        })
    }
}

static PATTERNS: LazyLock<Result<PromptPatterns, regex::Error>> = LazyLock::new(PromptPatterns::compile);

/// Locates the last publish clause preceded by a separator, as
/// `(topic_end, clause_start)`.
fn find_publish_clause(patterns: &PromptPatterns, text: &str) -> Option<(usize, usize)> {
    let mut found = None;
    let mut from = 0;
    while let Some(clause) = patterns.publish_clause.find_at(text, from) {
        let start = clause.start();
        if let Some(separator) = patterns.separator.find(&text[..start]) {
            // A prompt that is nothing but an instruction keeps its text as the topic.
            if separator.start() > 0 {
                found = Some((separator.start(), start));
            }
        }
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    found
}

fn platform_in(patterns: &PromptPatterns, text: &str) -> Option<PublishTargetKind> {
    patterns
        .platform
        .find(text)
        .and_then(|m| m.as_str().parse::<PublishTargetKind>().ok())
}

fn is_trailing_noise(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '?' | '!' | ',' | ';' | ':' | '"')
}

/// Parses a research prompt.
///
/// The topic keeps the user's wording apart from the stripped instructions.
pub fn parse_prompt(prompt: &str) -> Result<ResearchRequest, PromptError> {
    let raw = prompt.trim();
    if raw.is_empty() {
        return Err(PromptError::Empty);
    }
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| PromptError::Pattern(e.to_string()))?;

    let mut topic = raw.to_string();
    let mut target = None;
    if let Some((topic_end, clause_start)) = find_publish_clause(patterns, &topic) {
        target = platform_in(patterns, &topic[clause_start..]);
        topic.truncate(topic_end);
    }
    if let Some(found) = patterns.target_phrase.find(&topic) {
        if found.start() > 0 {
            target = target.or_else(|| platform_in(patterns, found.as_str()));
            topic.truncate(found.start());
        }
    }

    let topic = patterns.lead_in.replace(&topic, "");
    let topic = topic.trim_matches(is_trailing_noise);
    if topic.is_empty() {
        return Err(PromptError::NoTopic(raw.to_string()));
    }

    Ok(ResearchRequest::new(topic, target, raw))
}
