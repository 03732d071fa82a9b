use pubagent_core::{Error, Result};

pub const CONTEXT_SLOT: &str = "{context}";
pub const QUESTION_SLOT: &str = "{question}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Context,
    Question,
}

/// A prompt with one `{context}` and one `{question}` slot.
///
/// Rendering is a single pass over the parsed segments, so slot markers that
/// appear inside a question or a retrieved chunk are never expanded.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str, refusal: &str) -> Result<Self> {
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            let n = template.matches(slot).count();
            if n != 1 {
                return Err(Error::InvalidConfig(format!(
                    "prompt template must contain {slot} exactly once (found {n})"
                )));
            }
        }
        if refusal.trim().is_empty() {
            return Err(Error::InvalidConfig("prompt refusal text must not be empty".to_string()));
        }
        if !template.contains(refusal) {
            return Err(Error::InvalidConfig("prompt template must contain the refusal text".to_string()));
        }

        let mut segments = Vec::new();
        let mut rest = template;
        while let Some((pos, slot)) = next_slot(rest) {
            if pos > 0 {
                segments.push(Segment::Text(rest[..pos].to_string()));
            }
            segments.push(if slot == CONTEXT_SLOT { Segment::Context } else { Segment::Question });
            rest = &rest[pos + slot.len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

fn next_slot(text: &str) -> Option<(usize, &'static str)> {
    [CONTEXT_SLOT, QUESTION_SLOT]
        .into_iter()
        .filter_map(|slot| text.find(slot).map(|pos| (pos, slot)))
        .min_by_key(|(pos, _)| *pos)
}
