//! Blog title generation.
//!
//! Builds the prompt sent to the LLM and turns its free-form reply back into
//! a clean list of titles.

use crate::provider::{ChatRequest, Message};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Upper bound on titles per request.
pub const MAX_TITLE_COUNT: usize = 10;

const MAX_TOPIC_CHARS: usize = 500;
const MAX_KEYWORDS: usize = 20;

const SYSTEM_PROMPT: &str = "You are an experienced blog editor. \
Write compelling, specific blog post titles. \
Reply with a numbered list, one title per line, and nothing else.";

/// Leading list markers: `1.`, `2)`, `-`, `*`, `•`.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").unwrap());

/// Markdown emphasis wrapped around a whole title.
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*{1,2}(.+?)\*{1,2}$").unwrap());

/// Body of `POST /api/titles`.
#[derive(Debug, Clone, Deserialize)]
pub struct TitleRequest {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
}

impl TitleRequest {
    /// Check the request and return the trimmed topic.
    pub fn validate(&self) -> Result<&str, String> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err("Topic cannot be empty".into());
        }
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(format!("Topic too long (max {} characters)", MAX_TOPIC_CHARS));
        }
        if self.keywords.len() > MAX_KEYWORDS {
            return Err(format!("Too many keywords (max {})", MAX_KEYWORDS));
        }
        if let Some(count) = self.count {
            if count == 0 || count > MAX_TITLE_COUNT {
                return Err(format!("Count must be between 1 and {}", MAX_TITLE_COUNT));
            }
        }
        Ok(topic)
    }
}

/// Build the chat request asking for `count` titles about `topic`.
pub fn build_title_request(
    topic: &str,
    keywords: &[String],
    tone: Option<&str>,
    count: usize,
    model: &str,
) -> ChatRequest {
    let count = count.clamp(1, MAX_TITLE_COUNT);

    let mut prompt = format!("Suggest {} blog post titles about: {}", count, topic.trim());

    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        prompt.push_str(&format!("\nWork in these keywords where natural: {}", keywords.join(", ")));
    }

    if let Some(tone) = tone.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str(&format!("\nTone: {}", tone));
    }

    ChatRequest {
        model: model.to_string(),
        messages: vec![Message::user(prompt)],
        max_tokens: Some(60 * count as i64),
        temperature: Some(0.8),
        system: Some(SYSTEM_PROMPT.to_string()),
    }
}

/// Extract up to `count` titles from an LLM reply.
///
/// Accepts numbered, bulleted, quoted or plain lines. Blank lines, preamble
/// ending in a colon and duplicates are skipped.
pub fn parse_titles(content: &str, count: usize) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();

    for line in content.lines() {
        if titles.len() >= count {
            break;
        }

        let line = line.trim();
        if line.is_empty() || line.ends_with(':') {
            continue;
        }

        let stripped = LIST_MARKER.replace(line, "");
        let mut title = stripped.trim();
        if let Some(caps) = EMPHASIS.captures(title) {
            if let Some(inner) = caps.get(1) {
                title = inner.as_str().trim();
            }
        }
        let title = strip_quotes(title);

        if title.is_empty() || titles.iter().any(|t| t == title) {
            continue;
        }
        titles.push(title.to_string());
    }

    titles
}

fn strip_quotes(s: &str) -> &str {
    const PAIRS: [(char, char); 3] = [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')];
    for (open, close) in PAIRS {
        if s.chars().count() >= 2 && s.starts_with(open) && s.ends_with(close) {
            return s[open.len_utf8()..s.len() - close.len_utf8()].trim();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_title_request() {
        let keywords = vec!["bread".to_string(), " ".to_string(), "starter".to_string()];
        let request = build_title_request(
            " Sourdough at home ",
            &keywords,
            Some("playful"),
            5,
            "gpt-4o-mini",
        );

        assert_eq!(request.model, "gpt-4o-mini");
        assert!(request.system.as_deref().unwrap().contains("numbered list"));
        let prompt = &request.messages[0].content;
        assert!(prompt.starts_with("Suggest 5 blog post titles about: Sourdough at home"));
        assert!(prompt.contains("keywords where natural: bread, starter"));
        assert!(prompt.contains("Tone: playful"));
        assert_eq!(request.max_tokens, Some(300));
    }

    #[test]
    fn test_build_title_request_without_extras() {
        let request = build_title_request("Rust", &[], Some("  "), 50, "m");
        let prompt = &request.messages[0].content;
        assert!(prompt.starts_with("Suggest 10 blog post titles"));
        assert!(!prompt.contains("keywords"));
        assert!(!prompt.contains("Tone"));
    }

    #[test]
    fn test_parse_numbered_list() {
        let content = "Here are some ideas:\n\n1. First Title\n2) Second Title\n3. \"Third Title\"\n";
        assert_eq!(
            parse_titles(content, 5),
            vec!["First Title", "Second Title", "Third Title"]
        );
    }

    #[test]
    fn test_parse_bullets_and_emphasis() {
        let content = "- **Bold Move**\n* Plain Bullet\n• \u{201c}Curly Quotes\u{201d}\nNo Marker";
        assert_eq!(
            parse_titles(content, 10),
            vec!["Bold Move", "Plain Bullet", "Curly Quotes", "No Marker"]
        );
    }

    #[test]
    fn test_parse_respects_count_and_dedupes() {
        let content = "1. Same\n2. Same\n3. Other\n4. Extra";
        assert_eq!(parse_titles(content, 2), vec!["Same", "Other"]);
    }

    #[test]
    fn test_parse_empty_reply() {
        assert!(parse_titles("", 5).is_empty());
        assert!(parse_titles("\n  \n1. \n", 5).is_empty());
    }

    #[test]
    fn test_validate_request() {
        let mut request = TitleRequest {
            topic: "  Gardening  ".into(),
            keywords: vec![],
            tone: None,
            count: Some(3),
        };
        assert_eq!(request.validate().unwrap(), "Gardening");

        request.count = Some(0);
        assert!(request.validate().is_err());
        request.count = Some(11);
        assert!(request.validate().is_err());

        request.count = None;
        request.topic = "   ".into();
        assert!(request.validate().is_err());
    }
}
