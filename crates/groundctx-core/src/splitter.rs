//! Recursive character splitter.
//!
//! Breaks text on the coarsest separator present (paragraph, line, space,
//! character), then greedily merges the pieces back into chunks of at most
//! `chunk_size` characters that overlap by up to `chunk_overlap` characters.
use std::collections::VecDeque;

use crate::error::{Error, Result};

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_separators(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".into()));
        }
        if chunk_overlap > chunk_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({chunk_overlap}) is larger than chunk size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap, separators })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    /// Split `text` into trimmed, non-empty chunks in document order.
    pub fn split(&self, text: &str) -> Vec<String> { self.split_with(text, &self.separators) }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() { chunks.push(trimmed.to_string()); }
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;
        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&window, &mut merged);
                // keep at most `chunk_overlap` trailing characters for the next chunk
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            window.push_back((piece.as_str(), len));
            total += len;
        }
        push_joined(&window, &mut merged);
        merged
    }
}

fn push_joined(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split on `separator`, attaching it to the start of every piece after the first.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out = Vec::new();
    if let Some(first) = parts.next() {
        out.push(first.to_string());
    }
    out.extend(parts.map(|p| format!("{separator}{p}")));
    out.retain(|s| !s.is_empty());
    out
}

fn char_len(s: &str) -> usize { s.chars().count() }
