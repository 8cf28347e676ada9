// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt assembly under a token budget
//!
//! Layout of the rendered prompt:
//!
//! ```text
//! <instructions>
//!
//! <knowledge_sources>            (omitted when nothing was retrieved)
//! <source index=".." document=".." chunk=".." section=".." relevance="..">
//! chunk text
//! </source>
//! </knowledge_sources>
//!
//! <conversation_history>         (omitted when there is no history)
//! User: ..
//! Assistant: ..
//! </conversation_history>
//!
//! Question: ..
//! ```
//!
//! When the estimate exceeds the budget the oldest history message goes
//! first, then the lowest-similarity chunk. The question always stays.

use serde::Serialize;
use tracing::debug;

use super::index::{RetrievalResult, ScoredChunk};
use crate::sessions::{Message, Role};

const CONTEXT_INSTRUCTIONS: &str = "\
You are a helpful customer support assistant.

Answer the customer's question using ONLY the knowledge base sources provided below.
- Never invent information, policies or procedures that the sources do not contain.
- If the sources do not fully answer the question, say so plainly and offer to create a support ticket so a team member can follow up.
- Keep answers concise (two to four sentences unless more detail is clearly needed) and use a friendly, professional tone.

It is better to admit you do not know than to give incorrect information.";

const NO_CONTEXT_INSTRUCTIONS: &str = "\
You are a helpful customer support assistant.

No relevant information was found in the knowledge base for this question.
- Acknowledge that you do not have specific information about this topic.
- Let the customer know a support ticket will be created and a team member will follow up soon.
- Keep the reply to two or three empathetic sentences and do NOT make up information or give general advice.";

/// Estimated token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Reference from a prompt back to the chunk it quotes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub document_id: String,
    pub chunk_index: usize,
    pub similarity: f32,
}

/// A rendered prompt ready for the LLM
#[derive(Debug, Clone)]
pub struct Prompt {
    system: String,
    history: Vec<Message>,
    question: String,
    text: String,
    pub sources: Vec<Citation>,
    pub dropped_history: usize,
    pub dropped_chunks: usize,
}

impl Prompt {
    /// Full prompt as one string
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Instructions plus knowledge sources, for APIs with a system slot
    pub fn system_text(&self) -> &str {
        &self.system
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }

    /// History and question as chat messages
    ///
    /// Roles alternate and the first message is always from the user:
    /// leading assistant messages are dropped and consecutive messages with
    /// the same role are merged.
    pub fn messages(&self) -> Vec<(Role, String)> {
        let mut out: Vec<(Role, String)> = Vec::new();
        let turns = self
            .history
            .iter()
            .map(|m| (m.role, m.text.as_str()))
            .chain(std::iter::once((Role::User, self.question.as_str())));

        for (role, text) in turns {
            if out.is_empty() && role == Role::Assistant {
                continue;
            }
            match out.last_mut() {
                Some((last_role, last_text)) if *last_role == role => {
                    last_text.push_str("\n\n");
                    last_text.push_str(text);
                }
                _ => out.push((role, text.to_string())),
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    token_budget: usize,
}

impl PromptBuilder {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn build(&self, question: &str, retrieval: &RetrievalResult, history: &[Message]) -> Prompt {
        let mut history: Vec<Message> = history.to_vec();
        let mut chunks: Vec<ScoredChunk> = retrieval.results.clone();
        let mut dropped_history = 0;
        let mut dropped_chunks = 0;

        loop {
            let system = render_system(&chunks);
            let text = render_full(&system, &history, question);

            if estimate_tokens(&text) <= self.token_budget {
                return self.finish(system, text, history, question, &chunks, dropped_history, dropped_chunks);
            }

            if !history.is_empty() {
                history.remove(0);
                dropped_history += 1;
            } else if let Some(weakest) = weakest_chunk(&chunks) {
                chunks.remove(weakest);
                dropped_chunks += 1;
            } else {
                debug!(
                    "Prompt still exceeds budget of {} tokens with only the question left",
                    self.token_budget
                );
                return self.finish(system, text, history, question, &chunks, dropped_history, dropped_chunks);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        system: String,
        text: String,
        history: Vec<Message>,
        question: &str,
        chunks: &[ScoredChunk],
        dropped_history: usize,
        dropped_chunks: usize,
    ) -> Prompt {
        if dropped_history > 0 || dropped_chunks > 0 {
            debug!(
                "Prompt trimmed to budget: dropped {} history messages and {} chunks",
                dropped_history, dropped_chunks
            );
        }
        Prompt {
            system,
            history,
            question: question.to_string(),
            text,
            sources: chunks
                .iter()
                .map(|c| Citation {
                    document_id: c.chunk.document_id.clone(),
                    chunk_index: c.chunk.index,
                    similarity: c.similarity,
                })
                .collect(),
            dropped_history,
            dropped_chunks,
        }
    }
}

/// Index of the lowest-similarity chunk, the later one on ties
fn weakest_chunk(chunks: &[ScoredChunk]) -> Option<usize> {
    let mut weakest: Option<usize> = None;
    for (i, chunk) in chunks.iter().enumerate() {
        match weakest {
            Some(w) if chunks[w].similarity < chunk.similarity => {}
            _ => weakest = Some(i),
        }
    }
    weakest
}

fn escape_attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

fn render_system(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_INSTRUCTIONS.to_string();
    }

    let mut out = String::from(CONTEXT_INSTRUCTIONS);
    out.push_str("\n\n<knowledge_sources>\n");
    for (i, scored) in chunks.iter().enumerate() {
        let chunk = &scored.chunk;
        out.push_str(&format!(
            "<source index=\"{}\" document=\"{}\" chunk=\"{}\" section=\"{}\" relevance=\"{:.2}\">\n{}\n</source>\n",
            i + 1,
            escape_attr(&chunk.document_id),
            chunk.index,
            escape_attr(chunk.heading.as_deref().unwrap_or("")),
            scored.similarity,
            chunk.text
        ));
    }
    out.push_str("</knowledge_sources>");
    out
}

fn render_full(system: &str, history: &[Message], question: &str) -> String {
    let mut out = String::from(system);
    out.push_str("\n\n");
    if !history.is_empty() {
        out.push_str("<conversation_history>\n");
        for message in history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            out.push_str(speaker);
            out.push_str(": ");
            out.push_str(&message.text);
            out.push('\n');
        }
        out.push_str("</conversation_history>\n\n");
    }
    out.push_str("Question: ");
    out.push_str(question);
    out
}
