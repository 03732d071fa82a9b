use std::sync::Arc;

use tracing::{debug, warn};

use pubagent_core::config::{GenerationSettings, PromptSettings, RetrievalSettings, Settings};
use pubagent_core::traits::{GenerationRequest, Generator};
use pubagent_core::types::RetrievedChunk;
use pubagent_core::{Error, Result};
use pubagent_vector::EmbeddingIndex;

use crate::context::pack_context;
use crate::corpus::IndexState;
use crate::prompt::PromptTemplate;

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Chunks placed in the prompt, best first.
    pub sources: Vec<RetrievedChunk>,
    /// The request sent to the generator; `None` when it was not contacted.
    pub request: Option<GenerationRequest>,
}

pub struct RetrievalOrchestrator {
    index: Arc<EmbeddingIndex>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    retrieval: RetrievalSettings,
    generation: GenerationSettings,
    prompt: PromptSettings,
}

impl RetrievalOrchestrator {
    pub fn new(index: Arc<EmbeddingIndex>, generator: Arc<dyn Generator>, settings: &Settings) -> Result<Self> {
        let template = PromptTemplate::new(&settings.prompt.template, &settings.prompt.refusal)?;
        Ok(Self {
            index,
            generator,
            template,
            retrieval: settings.retrieval.clone(),
            generation: settings.generation.clone(),
            prompt: settings.prompt.clone(),
        })
    }

    /// Answer `question`, resolving every failure to a fixed user-facing sentence.
    pub async fn answer(&self, state: &IndexState, question: &str) -> String {
        match self.try_answer(state, question).await {
            Ok(answer) => answer.text,
            Err(e) => {
                warn!(error = %e, "answering failed");
                e.user_message().to_string()
            }
        }
    }

    pub async fn try_answer(&self, state: &IndexState, question: &str) -> Result<Answer> {
        let Some(index) = state.index() else {
            return Ok(self.no_documents());
        };
        let retrieved = match self.index.query(index, question, self.retrieval.top_k).await {
            Ok(retrieved) => retrieved,
            Err(Error::EmptyIndex) => return Ok(self.no_documents()),
            Err(e) => return Err(e),
        };
        for hit in retrieved.hits() {
            debug!(chunk = %hit.chunk_id, score = hit.score, "retrieved");
        }

        let (context, included) =
            pack_context(retrieved.hits(), &self.retrieval.delimiter, self.retrieval.max_context_chars);
        let request = GenerationRequest {
            system_instructions: self.prompt.system.clone(),
            assembled_prompt: self.template.render(&context, question),
        };

        let limit = self.generation.total_budget();
        let response = tokio::time::timeout(limit, self.generator.generate(&request))
            .await
            .map_err(|_| Error::Timeout(limit))??;
        let text = response.into_answer(&self.generation.answer_field, self.generation.strict_response_shape)?;

        let mut sources = retrieved.into_hits();
        sources.truncate(included);
        Ok(Answer { text, sources, request: Some(request) })
    }

    fn no_documents(&self) -> Answer {
        Answer { text: self.prompt.no_documents.clone(), sources: Vec::new(), request: None }
    }
}
