//! pubagent-rag
//!
//! The question-answering pipeline: [`CorpusManager`] turns the corpus
//! directory into an index, [`RetrievalOrchestrator`] retrieves, packs and
//! prompts the generator.

pub mod context;
pub mod corpus;
pub mod orchestrator;
pub mod prompt;

pub use corpus::{CorpusManager, IndexState};
pub use orchestrator::{Answer, RetrievalOrchestrator};
pub use prompt::PromptTemplate;
