use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicLabel {
    OnTopic,
    Clarify,
    OffTopic,
}

impl TopicLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTopic => "on_topic",
            Self::Clarify => "clarify",
            Self::OffTopic => "off_topic",
        }
    }
}

impl fmt::Display for TopicLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing one utterance against the on-topic prototypes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: TopicLabel,
    /// Best cosine similarity, clamped to `[0, 1]`.
    pub score: f32,
}
