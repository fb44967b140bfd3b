//! Line-oriented content stream tokenizer
//!
//! Each non-blank line of a decoded content stream is one instruction: its
//! last whitespace-delimited token is the operator, everything before it the
//! operands. Blank lines produce nothing but still count towards line
//! numbers.

use std::borrow::Cow;

use serde::Serialize;

/// One content stream instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// One-based page number
    pub page_number: usize,
    /// One-based line position in the decoded content, blank lines included
    pub line_number: usize,
    /// The line as written, without its line terminator
    ///
    /// The terminator is `\n`, or `\r\n` with the `\r` dropped as well.
    /// Any other whitespace is kept.
    pub raw_text: String,
    /// Tokens preceding the operator
    pub operand_tokens: Vec<String>,
    /// Final token of the line
    pub operator_name: String,
}

impl Instruction {
    /// Build an instruction from one line of content
    ///
    /// Returns `None` for blank or whitespace-only lines.
    pub fn from_line(line: &str, page_number: usize, line_number: usize) -> Option<Self> {
        let raw_text = line.strip_suffix('\r').unwrap_or(line);
        let mut tokens: Vec<String> = raw_text.split_whitespace().map(str::to_string).collect();
        let operator_name = tokens.pop()?;

        Some(Self {
            page_number,
            line_number,
            raw_text: raw_text.to_string(),
            operand_tokens: tokens,
            operator_name,
        })
    }
}

/// Lazy iterator over the instructions of a content stream
///
/// A clone continues from the same position; tokenizing the same bytes again
/// always yields the same sequence.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    text: Cow<'a, str>,
    position: Option<usize>,
    line_number: usize,
    page_number: usize,
}

/// Split decoded content into instructions for `page_number` (one-based)
///
/// Bytes that are not valid UTF-8 are replaced, which never affects the
/// ASCII operator names.
pub fn tokenize(bytes: &[u8], page_number: usize) -> Instructions<'_> {
    Instructions {
        text: String::from_utf8_lossy(bytes),
        position: Some(0),
        line_number: 0,
        page_number,
    }
}

impl Iterator for Instructions<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        while let Some(start) = self.position {
            let rest = &self.text[start..];
            let line = match rest.find('\n') {
                Some(end) => {
                    self.position = Some(start + end + 1);
                    &rest[..end]
                }
                None => {
                    self.position = None;
                    rest
                }
            };
            self.line_number += 1;

            let instruction = Instruction::from_line(line, self.page_number, self.line_number);
            if instruction.is_some() {
                return instruction;
            }
        }
        None
    }
}
