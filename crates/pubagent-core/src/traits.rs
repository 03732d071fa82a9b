use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given `id()` and input, and
/// must return L2-normalized vectors of length `dim()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model, e.g. `bert:all-MiniLM-L6-v2:d384`.
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("embedder returned no vector".to_string()))
    }
}

/// Request sent to a text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instructions: String,
    pub assembled_prompt: String,
}

/// What a generation service handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResponse {
    PlainText(String),
    Structured(Map<String, Value>),
}

impl GenerationResponse {
    /// Reduce the response to the answer text.
    ///
    /// `Structured` responses must expose `answer_field` as a string. When
    /// `strict` is false any other structure is serialized as JSON instead of
    /// being rejected.
    pub fn into_answer(self, answer_field: &str, strict: bool) -> Result<String> {
        match self {
            GenerationResponse::PlainText(text) => Ok(text),
            GenerationResponse::Structured(mut fields) => match fields.remove(answer_field) {
                Some(Value::String(answer)) => Ok(answer),
                Some(other) if !strict => Ok(other.to_string()),
                None if !strict => Ok(Value::Object(fields).to_string()),
                Some(_) => Err(Error::UnexpectedResponse(format!("field '{answer_field}' is not a string"))),
                None => Err(Error::UnexpectedResponse(format!("missing field '{answer_field}'"))),
            },
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        (**self).generate(request).await
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        (**self).generate(request).await
    }
}
