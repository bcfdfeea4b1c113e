//! Conversation-side guardrails for the menu assistant.
//!
//! Every guest turn goes through the same constrained loop:
//! 1. **Input check** (`guardrails`): the `topic` classifier screens the utterance and
//!    stated allergies are folded into the session.
//! 2. **Generation** (`llm`): only on-topic input reaches the language model.
//! 3. **Output check** (`guardrails`): allergen safety first, then prices against the
//!    catalog. Unsafe replies are replaced, wrong prices are rewritten.
//!
//! The model never decides prices or allergen facts; the catalog does.

pub mod bootstrap;
pub mod embedding;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod sessions;
pub mod topic;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use embedding::{build_embedder, Embedder, EmbeddingError, HashingEmbedder, OllamaEmbedder};
pub use guardrails::{BlockReason, GuardrailError, GuardrailManager, InputOutcome, OutputOutcome};
pub use llm::{HttpLlmClient, LlmClient};
pub use runtime::{AgentRuntime, ConversationSummary, ReplyDisposition, TurnReply};
pub use sessions::SessionStore;
pub use topic::TopicClassifier;
