//! Sentence scanning over text that may still be arriving.
//!
//! A sentence ends at a line break, `!`, `?`, their full-width forms, the
//! ideographic full stop, or a `.` that does not look like part of an
//! abbreviation or a decimal number. Tokens are raw slices of the input:
//! leading whitespace stays attached to the sentence that follows it, so
//! concatenating every token gives back the input (minus a whitespace-only
//! tail).

use crate::errors::{Error, Result};
use bytes::{Buf, BytesMut};
use std::str;
use tokio_util::codec::Decoder;

/// Longest word, in letters, that can be an abbreviation like `Dr.` or
/// `Mrs.`. Such a word is one when its first letter is upper-case.
const ABBREVIATION_LEN: usize = 5;

/// Characters that open a group; a `.` after a short word right after one of
/// these never ends a sentence.
const GROUP_OPENERS: &[char] = &['[', '(', '{', '"', '\''];

/// Outcome of looking at one candidate terminator.
enum Verdict {
    Boundary,
    Continue,
    /// The decision depends on input that has not arrived yet.
    NeedMore,
}

fn period_verdict(prev: &str, next: &str, eof: bool) -> Verdict {
    let mut rev = prev.chars().rev();
    let Some(last) = rev.next() else {
        return Verdict::Continue;
    };

    if last.is_alphabetic() {
        let mut first = last;
        let mut len = 1;
        loop {
            match rev.next() {
                None => break,
                Some(c) if c.is_whitespace() => break,
                Some(c) if GROUP_OPENERS.contains(&c) => return Verdict::Continue,
                Some(c) if c.is_alphabetic() && len < ABBREVIATION_LEN => {
                    first = c;
                    len += 1;
                }
                // a longer word, or one glued to a symbol
                Some(_) => return Verdict::Boundary,
            }
        }
        return if first.is_uppercase() {
            Verdict::Continue
        } else {
            Verdict::Boundary
        };
    }

    if last.is_ascii_digit() {
        return match next.chars().next() {
            Some(c) if c.is_ascii_digit() => Verdict::Continue,
            Some(_) => Verdict::Boundary,
            None if eof => Verdict::Boundary,
            None => Verdict::NeedMore,
        };
    }

    Verdict::Boundary
}

fn verdict(symbol: char, prev: &str, next: &str, eof: bool) -> Verdict {
    if prev.is_empty() {
        return Verdict::Continue;
    }
    match symbol {
        '\r' | '\n' | '!' | '?' | '。' | '！' | '？' => Verdict::Boundary,
        '.' => period_verdict(prev, next, eof),
        _ => Verdict::Continue,
    }
}

/// Byte length of the next sentence at the head of `text`, if one is
/// complete. With `eof` set a non-blank unterminated remainder counts as a
/// sentence.
fn sentence_end(text: &str, eof: bool) -> Option<usize> {
    let start = text
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)?;

    for (offset, symbol) in text[start..].char_indices() {
        let pos = start + offset;
        let end = pos + symbol.len_utf8();
        match verdict(symbol, &text[start..pos], &text[end..], eof) {
            Verdict::Boundary => return Some(end),
            Verdict::Continue => {}
            Verdict::NeedMore => return None,
        }
    }

    eof.then_some(text.len())
}

/// Split a complete text into sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut rest = text;
    while let Some(end) = sentence_end(rest, true) {
        let (sentence, tail) = rest.split_at(end);
        sentences.push(sentence);
        rest = tail;
    }
    sentences
}

/// Incremental form of [`split_sentences`] for use with
/// [`tokio_util::codec::FramedRead`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceDecoder;

impl SentenceDecoder {
    pub fn new() -> Self {
        Self
    }

    fn next_sentence(&mut self, buf: &mut BytesMut, eof: bool) -> Result<Option<String>> {
        let text = match str::from_utf8(&buf[..]) {
            Ok(text) => text,
            // A multi-byte character split across reads.
            Err(err) if err.error_len().is_none() && !eof => {
                str::from_utf8(&buf[..err.valid_up_to()])
                    .map_err(|err| Error::validation(err.to_string()))?
            }
            Err(err) => return Err(Error::validation(format!("input is not UTF-8: {}", err))),
        };

        match sentence_end(text, eof) {
            Some(end) => {
                let sentence = text[..end].to_owned();
                buf.advance(end);
                Ok(Some(sentence))
            }
            None => {
                if eof {
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Decoder for SentenceDecoder {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>> {
        self.next_sentence(buf, false)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>> {
        self.next_sentence(buf, true)
    }
}
