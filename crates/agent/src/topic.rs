use std::sync::Arc;

use menuguard_core::domain::topic::{ClassificationResult, TopicLabel};

use crate::embedding::{Embedder, EmbeddingError};

/// Below this best-prototype similarity an utterance is off topic.
pub const OFF_TOPIC_THRESHOLD: f32 = 0.40;
/// At or above this similarity an utterance is on topic.
pub const ON_TOPIC_THRESHOLD: f32 = 0.48;

pub const ON_TOPIC_PROTOTYPES: [&str; 28] = [
    // menu questions
    "What dishes are on the menu?",
    "Show me the menu.",
    "What kind of food is available here?",
    "What do you have?",
    // recommendations
    "Can you recommend something to eat?",
    "What's the most popular item?",
    "Help me choose what to order.",
    "What would you recommend?",
    "I need help ordering.",
    // prices
    "How much is the pasta?",
    "Which dishes are under ten dollars?",
    "What's the cheapest dish?",
    "How much does that cost?",
    // allergies
    "I'm allergic to peanuts.",
    "Which dishes are nut-free?",
    "Is this gluten-free?",
    "Does this contain dairy?",
    // diet and taste
    "I'm vegetarian.",
    "Show me something spicy.",
    "Give me something not too spicy.",
    "Do you have vegan options?",
    // comparisons
    "Which is better, the beef burger or the chicken burger?",
    "Compare the spicy tofu and the mild one.",
    // ordering
    "I want the pizza.",
    "I'll take that.",
    "That sounds great.",
    "I'd like to order.",
    "Can I get the burger?",
];

/// Maps a similarity score onto a label. Monotonic in `score`; NaN is off topic.
pub fn label_for_score(score: f32) -> TopicLabel {
    if score >= ON_TOPIC_THRESHOLD {
        TopicLabel::OnTopic
    } else if score >= OFF_TOPIC_THRESHOLD {
        TopicLabel::Clarify
    } else {
        TopicLabel::OffTopic
    }
}

/// Cosine similarity clamped to `[0, 1]`. Mismatched lengths and zero vectors
/// score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let (mut dot, mut left_norm, mut right_norm) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let similarity = dot / denominator;
    if similarity.is_finite() {
        similarity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

struct Prototype {
    text: String,
    vector: Vec<f32>,
}

/// Stateless similarity classifier over a fixed set of on-topic examples.
/// Prototype vectors are computed once at construction and must be non-empty
/// and of one length; utterances are held to the same length.
pub struct TopicClassifier {
    embedder: Arc<dyn Embedder>,
    prototypes: Vec<Prototype>,
}

impl TopicClassifier {
    pub async fn new(embedder: Arc<dyn Embedder>) -> Result<Self, EmbeddingError> {
        Self::with_prototypes(embedder, ON_TOPIC_PROTOTYPES).await
    }

    pub async fn with_prototypes<I, S>(
        embedder: Arc<dyn Embedder>,
        prototypes: I,
    ) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut embedded: Vec<Prototype> = Vec::new();
        for text in prototypes {
            let text = text.into();
            let vector = embedder.embed(&text).await?;
            let expected = embedded.first().map_or(vector.len(), |first| first.vector.len());
            if vector.is_empty() || vector.len() != expected {
                return Err(EmbeddingError::Dimension { expected, actual: vector.len() });
            }
            embedded.push(Prototype { text, vector });
        }
        if embedded.is_empty() {
            return Err(EmbeddingError::NoPrototypes);
        }
        Ok(Self { embedder, prototypes: embedded })
    }

    /// Length every utterance embedding must have.
    pub fn dimensions(&self) -> usize {
        self.prototypes.first().map_or(0, |prototype| prototype.vector.len())
    }

    pub fn prototype_count(&self) -> usize {
        self.prototypes.len()
    }

    pub fn prototypes(&self) -> impl Iterator<Item = &str> {
        self.prototypes.iter().map(|prototype| prototype.text.as_str())
    }

    pub async fn classify(&self, utterance: &str) -> Result<ClassificationResult, EmbeddingError> {
        let vector = self.embedder.embed(utterance).await?;
        let expected = self.dimensions();
        if vector.len() != expected {
            return Err(EmbeddingError::Dimension { expected, actual: vector.len() });
        }
        let score = self
            .prototypes
            .iter()
            .map(|prototype| cosine_similarity(&vector, &prototype.vector))
            .fold(0.0_f32, f32::max);

        Ok(ClassificationResult { label: label_for_score(score), score })
    }
}
