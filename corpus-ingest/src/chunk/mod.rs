//! Semantic chunking (C7): re-chunks cleaned markdown by token-count rules,
//! independent of the extractor's structural boundaries. This is the second
//! of the two coordinate systems the bulletproof matcher reconciles.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// One semantic chunk as produced directly by the chunker, before the
/// matcher has attached structural/position metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticChunkDraft {
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub word_count: i64,
    pub chunker_type: String,
    pub token_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingOutput {
    pub chunks: Vec<SemanticChunkDraft>,
}

/// Approximates token count the way a whitespace tokenizer would, without
/// pulling in a model-specific tokenizer — good enough for uniform sizing.
fn estimate_tokens(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Splits markdown into uniform-size chunks of approximately `target_tokens`
/// tokens, breaking on paragraph boundaries where possible so chunks don't
/// split mid-sentence. Character offsets are relative to `markdown`.
pub struct SemanticChunker {
    pub target_tokens: usize,
    pub chunker_type: String,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self {
            target_tokens: 200,
            chunker_type: "semantic_v1".to_string(),
        }
    }
}

impl SemanticChunker {
    pub fn chunk(&self, markdown: &str) -> Result<ChunkingOutput> {
        if markdown.trim().is_empty() {
            return Err(IngestError::EmptyChunking);
        }

        let mut chunks = Vec::new();
        let mut chunk_index = 0i64;
        let mut cursor = 0usize;
        let mut buffer = String::new();
        let mut buffer_start: Option<usize> = None;

        let mut offset = 0usize;
        for paragraph in split_keep_offsets(markdown) {
            let (text, start) = paragraph;
            if text.trim().is_empty() {
                offset = start + text.len();
                continue;
            }
            if buffer_start.is_none() {
                buffer_start = Some(start);
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(text.trim());

            if estimate_tokens(&buffer) >= self.target_tokens {
                let end = start + text.len();
                chunks.push(self.finalize(chunk_index, &buffer, buffer_start.unwrap(), end));
                chunk_index += 1;
                buffer.clear();
                buffer_start = None;
            }
            cursor = start + text.len();
            offset = cursor;
        }

        if !buffer.trim().is_empty() {
            chunks.push(self.finalize(chunk_index, &buffer, buffer_start.unwrap(), cursor.max(offset)));
        }

        if chunks.is_empty() {
            return Err(IngestError::EmptyChunking);
        }

        Ok(ChunkingOutput { chunks })
    }

    fn finalize(&self, chunk_index: i64, content: &str, start_offset: usize, end_offset: usize) -> SemanticChunkDraft {
        SemanticChunkDraft {
            chunk_index,
            content: content.to_string(),
            start_offset: start_offset as i64,
            end_offset: end_offset as i64,
            word_count: content.split_whitespace().count() as i64,
            chunker_type: self.chunker_type.clone(),
            token_count: estimate_tokens(content),
        }
    }
}

/// Splits on blank-line paragraph boundaries, returning each paragraph with
/// its starting byte offset in the original string.
fn split_keep_offsets(text: &str) -> Vec<(&str, usize)> {
    let mut result = Vec::new();
    let mut offset = 0usize;
    for part in text.split("\n\n") {
        result.push((part, offset));
        offset += part.len() + 2;
    }
    result
}
