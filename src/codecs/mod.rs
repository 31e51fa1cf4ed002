//! Built-in leaf converters.
//!
//! Every built-in encoding is a small [`CharEncoder`] that knows how to turn a
//! single `char` into bytes. [`CharToByte`] wraps one and implements the
//! incremental [`Converter`] contract on top: surrogate pairs split across
//! calls, output overflow, the unmappable-character policy and the optional
//! byte order mark.

use std::char::decode_utf16;
use std::fmt;

use crate::converter::{CarryBuffer, Converter};
use crate::{Error, Result};

mod single_byte;
mod unicode;

pub use single_byte::{Ascii, Latin1, TableEncoder};
pub use unicode::{Utf8, Utf16};

/// Substitute written for unmappable characters unless configured otherwise.
pub const DEFAULT_REPLACEMENT: char = '?';

/// Encodes one character at a time.
pub trait CharEncoder: Send + Sync + Clone + fmt::Debug + 'static {
    /// Write the encoding of `c` into `out`, returning the byte count, or
    /// `None` if `c` has no representation in this encoding.
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize>;

    /// Bytes written once at the start of a stream.
    fn preamble(&self) -> &[u8] {
        &[]
    }
}

/// Incremental converter driving a [`CharEncoder`].
#[derive(Debug, Clone)]
pub struct CharToByte<E> {
    name: String,
    encoder: E,
    carry: CarryBuffer,
    replacement: Option<char>,
    preamble_written: bool,
}

impl<E: CharEncoder> CharToByte<E> {
    /// Create a converter for the canonical encoding `name`.
    pub fn new(name: impl Into<String>, encoder: E) -> Self {
        Self {
            name: name.into(),
            encoder,
            carry: CarryBuffer::new(),
            replacement: Some(DEFAULT_REPLACEMENT),
            preamble_written: false,
        }
    }

    /// Set the unmappable-character policy: `Some(c)` substitutes `c`, `None`
    /// reports the character as an error.
    pub fn with_replacement(mut self, replacement: Option<char>) -> Self {
        self.replacement = replacement;
        self
    }

    /// The wrapped encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    fn substitute(&self, scratch: &mut [u8; 4]) -> Option<usize> {
        self.replacement
            .and_then(|r| self.encoder.encode_char(r, scratch))
    }

    /// Encode `src`, the carried units followed by `carried..` fresh input.
    ///
    /// A reported character is dropped; every other unit of `src` stays
    /// carried, and `position` counts from the start of the fresh input.
    fn encode_units(&mut self, src: &[u16], to: &mut [u8], carried: usize) -> Result<usize> {
        let mut written = 0;
        let wrote_preamble = !self.preamble_written;

        if wrote_preamble {
            let preamble = self.encoder.preamble();
            if preamble.len() > to.len() {
                self.carry(src);
                return Ok(0);
            }
            to[..preamble.len()].copy_from_slice(preamble);
            written = preamble.len();
            self.preamble_written = true;
        }

        let mut scratch = [0u8; 4];
        let mut pos = 0;
        while pos < src.len() {
            let unit = src[pos];
            if (0xD800..0xDC00).contains(&unit) && pos + 1 == src.len() {
                // The low half has not arrived yet.
                break;
            }

            let (encoded, width) = match decode_utf16([unit, *src.get(pos + 1).unwrap_or(&0)])
                .next()
            {
                Some(Ok(c)) => match self.encoder.encode_char(c, &mut scratch) {
                    Some(n) => (n, c.len_utf16()),
                    None => match self.substitute(&mut scratch) {
                        Some(n) => (n, c.len_utf16()),
                        None => {
                            self.reject(src, pos, c.len_utf16(), wrote_preamble);
                            return Err(Error::UnmappableTarget {
                                character: c,
                                position: pos.saturating_sub(carried),
                            });
                        }
                    },
                },
                _ => match self.substitute(&mut scratch) {
                    Some(n) => (n, 1),
                    None => {
                        self.reject(src, pos, 1, wrote_preamble);
                        return Err(Error::MalformedInput {
                            unit,
                            position: pos.saturating_sub(carried),
                        });
                    }
                },
            };

            if written + encoded > to.len() {
                break;
            }
            to[written..written + encoded].copy_from_slice(&scratch[..encoded]);
            written += encoded;
            pos += width;
        }

        if pos < src.len() {
            self.carry(&src[pos..]);
        }
        Ok(written)
    }

    /// Undo a failed call: the caller never sees its output, so everything
    /// but the `width` units at `pos` goes back into the carry buffer.
    fn reject(&mut self, src: &[u16], pos: usize, width: usize, wrote_preamble: bool) {
        if wrote_preamble {
            self.preamble_written = false;
        }
        // A fresh copy, so the units stay carried under a flush too.
        let mut kept = src[..pos].to_vec();
        kept.extend_from_slice(&src[pos + width..]);
        if !kept.is_empty() {
            self.carry(&kept);
        }
    }

    fn char_bytes(&self, c: Option<char>) -> usize {
        let mut scratch = [0u8; 4];
        c.and_then(|c| self.encoder.encode_char(c, &mut scratch))
            .or_else(|| self.substitute(&mut scratch))
            .unwrap_or(0)
    }
}

impl<E: CharEncoder> Converter for CharToByte<E> {
    fn encoding(&self) -> &str {
        &self.name
    }

    fn carry_buffer(&self) -> &CarryBuffer {
        &self.carry
    }

    fn carry_buffer_mut(&mut self) -> &mut CarryBuffer {
        &mut self.carry
    }

    fn convert(&mut self, from: &[u16], to: &mut [u8]) -> Result<usize> {
        let carried = self.carry.len();
        if carried == 0 {
            return self.encode_units(from, to, 0);
        }
        let mut joined = self.carry.take_pending();
        joined.extend_from_slice(from);
        self.encode_units(&joined, to, carried)
    }

    fn number_of_bytes(&self, from: &[u16]) -> usize {
        let preamble = if self.preamble_written {
            0
        } else {
            self.encoder.preamble().len()
        };
        let end = match from.last() {
            Some(0xD800..=0xDBFF) => from.len() - 1,
            _ => from.len(),
        };
        preamble
            + decode_utf16(from[..end].iter().copied())
                .map(|c| self.char_bytes(c.ok()))
                .sum::<usize>()
    }

    fn box_clone(&self) -> Box<dyn Converter> {
        Box::new(self.clone())
    }
}

/// Encodings with a built-in converter, addressed by canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Hardcoded fallback, Latin-1 with `?` for anything else
    Default,
    /// US-ASCII (7-bit)
    Ascii,
    /// ISO-8859-1 (Latin-1)
    Latin1,
    /// UTF-8
    Utf8,
    /// UTF-16 big endian, no byte order mark
    Utf16BeUnmarked,
    /// UTF-16 little endian, no byte order mark
    Utf16LeUnmarked,
    /// UTF-16 big endian with a byte order mark
    Utf16Be,
    /// UTF-16 little endian with a byte order mark
    Utf16Le,
}

impl Builtin {
    /// Every built-in encoding.
    pub const ALL: [Builtin; 8] = [
        Builtin::Default,
        Builtin::Ascii,
        Builtin::Latin1,
        Builtin::Utf8,
        Builtin::Utf16BeUnmarked,
        Builtin::Utf16LeUnmarked,
        Builtin::Utf16Be,
        Builtin::Utf16Le,
    ];

    /// Canonical name used by the alias table and the registry.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Default => "Default",
            Builtin::Ascii => "ASCII",
            Builtin::Latin1 => "8859_1",
            Builtin::Utf8 => "UTF8",
            Builtin::Utf16BeUnmarked => "UnicodeBigUnmarked",
            Builtin::Utf16LeUnmarked => "UnicodeLittleUnmarked",
            Builtin::Utf16Be => "UnicodeBig",
            Builtin::Utf16Le => "UnicodeLittle",
        }
    }

    /// Look up a built-in by canonical name.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Check if this encoding uses more than one byte for some characters
    pub fn is_multibyte(self) -> bool {
        matches!(
            self,
            Builtin::Utf8
                | Builtin::Utf16BeUnmarked
                | Builtin::Utf16LeUnmarked
                | Builtin::Utf16Be
                | Builtin::Utf16Le
        )
    }

    /// The byte order mark written at the start of a stream, if any.
    pub fn bom(self) -> Option<&'static [u8]> {
        match self {
            Builtin::Utf16Be => Some(&[0xFE, 0xFF]),
            Builtin::Utf16Le => Some(&[0xFF, 0xFE]),
            _ => None,
        }
    }

    /// Instantiate a fresh converter.
    pub fn converter(self) -> Box<dyn Converter> {
        let name = self.name();
        match self {
            Builtin::Default | Builtin::Latin1 => Box::new(CharToByte::new(name, Latin1)),
            Builtin::Ascii => Box::new(CharToByte::new(name, Ascii)),
            Builtin::Utf8 => Box::new(CharToByte::new(name, Utf8)),
            Builtin::Utf16BeUnmarked => Box::new(CharToByte::new(name, Utf16::big_endian(false))),
            Builtin::Utf16LeUnmarked => {
                Box::new(CharToByte::new(name, Utf16::little_endian(false)))
            }
            Builtin::Utf16Be => Box::new(CharToByte::new(name, Utf16::big_endian(true))),
            Builtin::Utf16Le => Box::new(CharToByte::new(name, Utf16::little_endian(true))),
        }
    }
}

/// The converter `Registry::get_default` falls back to.
pub fn default_converter() -> Box<dyn Converter> {
    Builtin::Default.converter()
}
