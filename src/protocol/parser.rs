//! Resumable Parsers
//!
//! Each parser owns its partial progress (accumulated bytes, cursor, target
//! length) so the server can feed it whatever a non-blocking read produced,
//! one byte or one megabyte at a time, without ever restarting from zero.
//!
//! Every `advance` call consumes bytes from the front of `input` and stops as
//! soon as its target is reached, leaving the rest for the next phase.

use super::types::{ProtocolError, SIZE_FIELD_LEN, Verb};

/// Result of feeding a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// Input ran out before the target was reached.
    Pending,
    Complete(T),
    Failed(ProtocolError),
}

/// Identifies the verb by matching a growing prefix against every known request shape.
#[derive(Debug, Default)]
pub struct VerbMatcher {
    buf: Vec<u8>,
}

impl VerbMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, input: &mut &[u8]) -> Progress<Verb> {
        while let Some((&byte, rest)) = input.split_first() {
            *input = rest;
            self.buf.push(byte);

            let mut still_possible = false;
            for verb in Verb::ALL {
                let prefix = verb.prefix();
                if prefix.starts_with(&self.buf) {
                    if prefix.len() == self.buf.len() {
                        return Progress::Complete(verb);
                    }
                    still_possible = true;
                }
            }

            if !still_possible {
                return Progress::Failed(ProtocolError::InvalidVerb);
            }
        }

        Progress::Pending
    }

    /// Number of bytes accumulated so far.
    pub fn consumed(&self) -> usize {
        self.buf.len()
    }
}

/// Reads one `\n`-terminated line of bounded length.
#[derive(Debug)]
pub struct LineParser {
    buf: Vec<u8>,
    max_len: usize,
}

impl LineParser {
    /// `max_len` counts the terminating newline.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn advance(&mut self, input: &mut &[u8]) -> Progress<String> {
        // Room left for non-newline bytes.
        let room = self.max_len - 1 - self.buf.len();

        match input.iter().position(|&b| b == b'\n') {
            Some(pos) if pos <= room => {
                self.buf.extend_from_slice(&input[..pos]);
                *input = &input[pos + 1..];
                match String::from_utf8(std::mem::take(&mut self.buf)) {
                    Ok(line) => Progress::Complete(line),
                    Err(_) => Progress::Failed(ProtocolError::IncorrectDataAmount),
                }
            }
            _ if input.len() > room => {
                // The byte after the last free slot is not a newline.
                *input = &input[room..];
                self.buf.clear();
                Progress::Failed(ProtocolError::IncorrectDataAmount)
            }
            _ => {
                self.buf.extend_from_slice(input);
                *input = &[];
                Progress::Pending
            }
        }
    }
}

/// Reads the fixed-width, native-endian length field.
#[derive(Debug, Default)]
pub struct SizeField {
    bytes: [u8; SIZE_FIELD_LEN],
    filled: usize,
}

impl SizeField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, input: &mut &[u8]) -> Progress<u64> {
        let take = input.len().min(SIZE_FIELD_LEN - self.filled);
        self.bytes[self.filled..self.filled + take].copy_from_slice(&input[..take]);
        self.filled += take;
        *input = &input[take..];

        if self.filled == SIZE_FIELD_LEN {
            Progress::Complete(u64::from_ne_bytes(self.bytes))
        } else {
            Progress::Pending
        }
    }

    pub fn filled(&self) -> usize {
        self.filled
    }
}

/// Collects exactly `target` bytes.
#[derive(Debug)]
pub struct ExactBytes {
    buf: Vec<u8>,
    target: usize,
}

impl ExactBytes {
    pub fn new(target: usize) -> Self {
        Self {
            buf: Vec::with_capacity(target.min(64 * 1024)),
            target,
        }
    }

    pub fn advance(&mut self, input: &mut &[u8]) -> Progress<Vec<u8>> {
        let take = input.len().min(self.target - self.buf.len());
        self.buf.extend_from_slice(&input[..take]);
        *input = &input[take..];

        if self.buf.len() == self.target {
            Progress::Complete(std::mem::take(&mut self.buf))
        } else {
            Progress::Pending
        }
    }

    pub fn remaining(&self) -> usize {
        self.target - self.buf.len()
    }
}
