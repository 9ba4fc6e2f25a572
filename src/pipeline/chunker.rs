//! Overlapping, size-bounded context windows over a normalized document.
//!
//! Sizes are measured in characters, the unit the extraction budget is
//! expressed in. Consecutive chunks overlap by exactly the configured
//! overlap so an item straddling a boundary is seen whole by at least one
//! chunk; the merge engine absorbs the resulting duplicate detections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How far back from the target offset a safe split point is searched for,
/// in characters.
const SPLIT_LOOKBACK: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkerError {
    #[error("chunk target size must be greater than zero")]
    ZeroTarget,

    #[error("overlap ({overlap}) must be smaller than the target size ({target})")]
    OverlapTooLarge { overlap: usize, target: usize },
}

/// One window of document text. Offsets are character positions in the
/// source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splits document text into overlapping windows, preferring boundaries
/// that fall just after a line break at zero bracket depth so that
/// table-row-like records are never cut mid-record when a safe point
/// exists nearby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    target: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(target: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if target == 0 {
            return Err(ChunkerError::ZeroTarget);
        }
        if overlap >= target {
            return Err(ChunkerError::OverlapTooLarge { overlap, target });
        }
        Ok(Self { target, overlap })
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazy, restartable iterator over the document's chunks.
    /// An empty document yields no chunks.
    pub fn chunks<'a>(&self, text: &'a str) -> ChunkIter<'a> {
        // Byte offset of each character, plus a trailing sentinel, so chunk
        // positions can be exact character counts while slicing stays on
        // UTF-8 boundaries.
        let mut byte_of_char: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_of_char.push(text.len());

        ChunkIter {
            text,
            byte_of_char,
            target: self.target,
            overlap: self.overlap,
            next_start: 0,
            index: 0,
        }
    }
}

pub struct ChunkIter<'a> {
    text: &'a str,
    byte_of_char: Vec<usize>,
    target: usize,
    overlap: usize,
    /// Character position the next chunk starts at.
    next_start: usize,
    index: usize,
}

impl<'a> ChunkIter<'a> {
    fn total_chars(&self) -> usize {
        self.byte_of_char.len() - 1
    }

    fn char_at(&self, pos: usize) -> char {
        self.text[self.byte_of_char[pos]..].chars().next().unwrap()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.byte_of_char[start]..self.byte_of_char[end]]
    }

    /// Best end position at or before `raw_end`: just after a newline at
    /// zero bracket depth, within the look-back window. Falls back to the
    /// raw offset when no safe point exists. The returned position always
    /// leaves room for forward progress past the next chunk's overlap.
    fn safe_end(&self, start: usize, raw_end: usize) -> usize {
        let window_floor = raw_end
            .saturating_sub(SPLIT_LOOKBACK)
            .max(start + self.overlap + 1);

        let mut depth: u32 = 0;
        let mut best = None;

        for pos in start..raw_end {
            match self.char_at(pos) {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                '\n' => {
                    let end_candidate = pos + 1;
                    if depth == 0 && end_candidate >= window_floor && end_candidate <= raw_end
                    {
                        best = Some(end_candidate);
                    }
                }
                _ => {}
            }
        }

        best.unwrap_or(raw_end)
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let total = self.total_chars();
        if self.next_start >= total {
            return None;
        }

        let start = self.next_start;
        let raw_end = (start + self.target).min(total);
        let end = if raw_end == total {
            total
        } else {
            self.safe_end(start, raw_end)
        };

        let chunk = Chunk {
            index: self.index,
            start,
            end,
            text: self.slice(start, end).to_string(),
        };

        self.index += 1;
        self.next_start = if end == total { total } else { end - self.overlap };

        Some(chunk)
    }
}
