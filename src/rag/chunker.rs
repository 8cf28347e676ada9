// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Overlapping passage splitter
//!
//! Each window of at most `max_chunk_size` characters ends at the strongest
//! natural break found in its second half: a markdown heading, then a
//! paragraph break, then a sentence end, then any whitespace. Without one the
//! window is cut hard. Offsets are character (not byte) positions.

use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;
use thiserror::Error;

use crate::knowledge::{Document, DocumentFormat};

const BREAK_WHITESPACE: u8 = 1;
const BREAK_SENTENCE: u8 = 2;
const BREAK_PARAGRAPH: u8 = 3;
const BREAK_HEADING: u8 = 4;

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("paragraph pattern is valid"))
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[.!?]["')\]]*\s"#).expect("sentence pattern is valid"))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be greater than 0")]
    ZeroSize,

    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

/// A passage of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Position of this chunk within its document, from 0
    pub index: usize,
    pub text: String,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    /// Nearest markdown heading at or before `start`
    pub heading: Option<String>,
}

impl Chunk {
    /// Text handed to the embedder
    ///
    /// A chunk that does not contain its section heading is prefixed with it
    /// (`"Refunds: ..."`) so passages deep inside a section still match
    /// questions about the section topic. `text` itself stays the exact span.
    pub fn embedding_text(&self) -> Cow<'_, str> {
        match &self.heading {
            Some(heading) if !heading.is_empty() && !self.text.contains(heading.as_str()) => {
                Cow::Owned(format!("{}: {}", heading, self.text))
            }
            _ => Cow::Borrowed(&self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap: usize,
}

struct Heading {
    start: usize,
    title: String,
}

impl Chunker {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if max_chunk_size == 0 {
            return Err(ChunkerError::ZeroSize);
        }
        if overlap >= max_chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                overlap,
                size: max_chunk_size,
            });
        }
        Ok(Self {
            max_chunk_size,
            overlap,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split a document; the same input always yields the same chunks
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        let to_char = |byte: usize| match byte_offsets.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i,
        };

        let headings = match document.format {
            DocumentFormat::Markdown => markdown_headings(text)
                .into_iter()
                .map(|(byte, title)| Heading {
                    start: to_char(byte),
                    title,
                })
                .collect(),
            DocumentFormat::PlainText => Vec::new(),
        };

        // breaks[i] = strength of ending a chunk just before char i
        let mut breaks = vec![0u8; n + 1];
        for (i, c) in chars.iter().enumerate() {
            if c.is_whitespace() {
                breaks[i + 1] = breaks[i + 1].max(BREAK_WHITESPACE);
            }
        }
        for m in sentence_re().find_iter(text) {
            let i = to_char(m.end());
            breaks[i] = breaks[i].max(BREAK_SENTENCE);
        }
        for m in paragraph_re().find_iter(text) {
            let i = to_char(m.end());
            breaks[i] = breaks[i].max(BREAK_PARAGRAPH);
        }
        for heading in &headings {
            breaks[heading.start] = breaks[heading.start].max(BREAK_HEADING);
        }

        let mut chunks = Vec::new();
        let mut start = skip_whitespace(&chars, 0);

        while start < n {
            let end = if n - start <= self.max_chunk_size {
                n
            } else {
                self.find_break(&breaks, start)
            };

            let (span_start, span_end) = trim_span(&chars, start, end);
            if span_start < span_end {
                let heading = headings
                    .iter()
                    .take_while(|h| h.start <= span_start)
                    .last()
                    .map(|h| h.title.clone());
                chunks.push(Chunk {
                    document_id: document.id.clone(),
                    index: chunks.len(),
                    text: chars[span_start..span_end].iter().collect(),
                    start: span_start,
                    end: span_end,
                    heading,
                });
            }

            if end >= n {
                break;
            }
            start = self.next_start(&chars, start, end);
        }

        chunks
    }

    fn find_break(&self, breaks: &[u8], start: usize) -> usize {
        let limit = start + self.max_chunk_size;
        let floor = start + self.max_chunk_size / 2;

        let mut best = limit;
        let mut best_strength = 0u8;
        for i in (floor + 1..=limit).rev() {
            if breaks[i] > best_strength {
                best = i;
                best_strength = breaks[i];
            }
        }
        best
    }

    fn next_start(&self, chars: &[char], start: usize, end: usize) -> usize {
        let next = end.saturating_sub(self.overlap).max(start + 1);

        // Begin the overlap on a word boundary when the overlap contains one
        let mut aligned = next;
        while aligned < end
            && !chars[aligned - 1].is_whitespace()
            && !chars[aligned].is_whitespace()
        {
            aligned += 1;
        }
        if aligned < end {
            skip_whitespace(chars, aligned)
        } else {
            skip_whitespace(chars, next)
        }
    }
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn trim_span(chars: &[char], mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    (start, end)
}

/// Byte offset and plain-text title of every heading
fn markdown_headings(text: &str) -> Vec<(usize, String)> {
    let mut headings = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading(..)) => current = Some((range.start, String::new())),
            Event::End(Tag::Heading(..)) => {
                if let Some((start, title)) = current.take() {
                    headings.push((start, title.trim().to_string()));
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, title)) = current.as_mut() {
                    title.push_str(&t);
                }
            }
            _ => {}
        }
    }

    headings
}
