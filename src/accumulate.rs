//! Caller-side accumulation of Gemini fragments.
//!
//! [`GenerationBuffer`] turns the fragments of a streamed generation into
//! the two things a UI shows: the reasoning steps (parts flagged `thought`)
//! and the output text. Because a retried generation starts over from
//! scratch, the buffer clears itself when a fragment from a newer attempt
//! arrives.

use serde::Deserialize;
use serde_json::Value;

use crate::client::Fragment;

/// One reasoning step streamed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtStep {
    /// First line of the thought.
    pub title: String,
    /// Everything after the first line.
    pub content: String,
}

impl ThoughtStep {
    fn parse(text: &str) -> Self {
        match text.split_once('\n') {
            Some((title, content)) => Self {
                title: title.to_string(),
                content: content.to_string(),
            },
            None => Self {
                title: text.to_string(),
                content: String::new(),
            },
        }
    }
}

/// A content part inside a Gemini chunk.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ChunkPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

/// Parts of the first candidate of a chunk. Anything unexpected yields none.
pub fn chunk_parts(payload: &Value) -> Vec<ChunkPart> {
    serde_json::from_value::<Chunk>(payload.clone())
        .ok()
        .and_then(|chunk| chunk.candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default()
}

/// Accumulated output and reasoning of one logical generation.
///
/// # Example
///
/// ```
/// use llm_resilience::accumulate::GenerationBuffer;
/// use llm_resilience::Fragment;
/// use serde_json::json;
///
/// let mut buffer = GenerationBuffer::new();
/// buffer.push(&Fragment {
///     attempt: 0,
///     index: 0,
///     payload: json!({"candidates": [{"content": {"parts": [
///         {"text": "Reading the job post\nKeywords: Rust, async", "thought": true},
///         {"text": "# Jane Doe"}
///     ]}}]}),
/// });
/// assert_eq!(buffer.text(), "# Jane Doe");
/// assert_eq!(buffer.thoughts()[0].title, "Reading the job post");
/// ```
#[derive(Debug, Clone, Default)]
pub struct GenerationBuffer {
    attempt: Option<u32>,
    text: String,
    thoughts: Vec<ThoughtStep>,
    restarts: u32,
}

impl GenerationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment. Returns `true` if it started a new attempt and the
    /// buffer was reset.
    pub fn push(&mut self, fragment: &Fragment) -> bool {
        let restarted = match self.attempt {
            Some(current) if fragment.attempt > current => {
                self.text.clear();
                self.thoughts.clear();
                self.restarts += 1;
                true
            }
            _ => false,
        };
        self.attempt = Some(fragment.attempt);

        for part in chunk_parts(&fragment.payload) {
            let Some(text) = part.text.filter(|t| !t.is_empty()) else {
                continue;
            };
            if part.thought {
                self.thoughts.push(ThoughtStep::parse(&text));
            } else {
                self.text.push_str(&text);
            }
        }
        restarted
    }

    /// Output text so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn thoughts(&self) -> &[ThoughtStep] {
        &self.thoughts
    }

    /// Whether any output text (as opposed to reasoning) has arrived.
    pub fn is_generating_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// How many times a retry discarded earlier content.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
