//! Converters backed by the system codec library (`encoding_rs`).

use std::fmt;

use encoding_rs::{Encoder, EncoderResult, Encoding};
use log::debug;

use crate::converter::{CarryBuffer, Converter};
use crate::{Error, Result};

/// Builds converters for encodings the crate has no own implementation of.
pub trait SystemCodec: Send + Sync {
    /// Construct a converter for `canonical`.
    ///
    /// [`Error::UnsupportedEncoding`] means the codec definitely cannot serve
    /// the name; any other error is treated as a transient failure.
    fn construct(&self, canonical: &str) -> Result<Box<dyn Converter>>;
}

/// [`SystemCodec`] backed by the WHATWG encoders of `encoding_rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingRsCodec;

/// WHATWG labels for canonical names `Encoding::for_label` does not know.
const LABELS: &[(&str, &str)] = &[
    ("SJIS", "shift_jis"),
    ("EUC_JP", "euc-jp"),
    ("ISO2022JP", "iso-2022-jp"),
    ("EUC_KR", "euc-kr"),
    ("KOI8_R", "koi8-r"),
    ("8859_2", "iso-8859-2"),
    ("8859_5", "iso-8859-5"),
    ("8859_7", "iso-8859-7"),
    ("8859_9", "iso-8859-9"),
    ("8859_15", "iso-8859-15"),
];

impl EncodingRsCodec {
    /// The `encoding_rs` encoding for a canonical name, if it can encode.
    pub fn lookup(canonical: &str) -> Option<&'static Encoding> {
        let label = LABELS
            .iter()
            .find(|(name, _)| *name == canonical)
            .map(|(_, label)| *label)
            .unwrap_or(canonical);

        let encoding = Encoding::for_label(label.as_bytes())
            .or_else(|| Encoding::for_label(label.replace('_', "-").as_bytes()))?;
        // UTF-16 and "replacement" encode to UTF-8; not a faithful encoder.
        (encoding.output_encoding() == encoding).then_some(encoding)
    }
}

impl SystemCodec for EncodingRsCodec {
    fn construct(&self, canonical: &str) -> Result<Box<dyn Converter>> {
        let encoding = Self::lookup(canonical)
            .ok_or_else(|| Error::UnsupportedEncoding(canonical.to_owned()))?;
        debug!("system codec serves {} as {}", canonical, encoding.name());
        Ok(Box::new(SystemConverter::new(canonical, encoding)))
    }
}

/// Incremental converter driving an `encoding_rs::Encoder`.
pub struct SystemConverter {
    name: String,
    encoding: &'static Encoding,
    encoder: Encoder,
    carry: CarryBuffer,
    replacement: Option<u8>,
    /// Output was produced since the encoder was last finalized.
    dirty: bool,
}

impl SystemConverter {
    /// Create a converter named `canonical` that encodes with `encoding`.
    pub fn new(canonical: impl Into<String>, encoding: &'static Encoding) -> Self {
        Self {
            name: canonical.into(),
            encoding,
            encoder: encoding.new_encoder(),
            carry: CarryBuffer::new(),
            replacement: Some(b'?'),
            dirty: false,
        }
    }

    /// Set the unmappable-character policy: `Some(b)` writes the ASCII byte
    /// `b`, `None` reports the character as an error.
    pub fn with_replacement(mut self, replacement: Option<u8>) -> Self {
        self.replacement = replacement;
        self
    }

    /// The `encoding_rs` encoding in use.
    pub fn system_encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Encode `src`, the carried units followed by `carried..` fresh input.
    ///
    /// The encoder cannot be rewound, so output already written is never
    /// thrown away: an unmappable character under the reporting policy stops
    /// the call in front of it and is reported once it heads the input.
    fn encode_units(&mut self, src: &[u16], to: &mut [u8], carried: usize) -> Result<usize> {
        let end = match src.last() {
            Some(0xD800..=0xDBFF) => src.len() - 1,
            _ => src.len(),
        };

        let mut read = 0;
        let mut written = 0;
        loop {
            let (result, r, w) = self.encoder.encode_from_utf16_without_replacement(
                &src[read..end],
                &mut to[written..],
                false,
            );
            read += r;
            written += w;
            if w > 0 {
                self.dirty = true;
            }

            match result {
                EncoderResult::InputEmpty | EncoderResult::OutputFull => break,
                EncoderResult::Unmappable(c) => {
                    let start = read - c.len_utf16();
                    match self.replacement {
                        Some(byte) if written < to.len() => {
                            to[written] = byte;
                            written += 1;
                            self.dirty = true;
                        }
                        Some(_) => {
                            // No room for the substitute; retry the character later.
                            read = start;
                            break;
                        }
                        // Copies, so the units stay carried under a flush too.
                        None if written > 0 => {
                            let rest = src[start..].to_vec();
                            self.carry(&rest);
                            return Ok(written);
                        }
                        None => {
                            let rest = src[read..].to_vec();
                            if !rest.is_empty() {
                                self.carry(&rest);
                            }
                            return Err(Error::UnmappableTarget {
                                character: c,
                                position: start.saturating_sub(carried),
                            });
                        }
                    }
                }
            }
        }

        if read < src.len() {
            self.carry(&src[read..]);
        }
        Ok(written)
    }
}

impl fmt::Debug for SystemConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemConverter")
            .field("name", &self.name)
            .field("encoding", &self.encoding.name())
            .field("pending", &self.carry.len())
            .finish()
    }
}

impl Converter for SystemConverter {
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
        // Worst case; finalizing a stateful encoder adds at most a few bytes.
        self.encoder
            .max_buffer_length_from_utf16_without_replacement(from.len())
            .map_or(usize::MAX, |n| n + 8)
    }

    /// Clones start from a fresh encoder state; carried units are kept.
    fn box_clone(&self) -> Box<dyn Converter> {
        let mut copy = SystemConverter::new(self.name.clone(), self.encoding)
            .with_replacement(self.replacement);
        copy.carry = self.carry.clone();
        Box::new(copy)
    }

    /// Drain the carried units, then return the encoder to its initial state
    /// if it produced output since the last finish.
    fn finish(&mut self, to: &mut [u8]) -> Result<usize> {
        let mut written = self.flush(to)?;
        if !self.dirty {
            return Ok(written);
        }

        let (result, _, w) =
            self.encoder
                .encode_from_utf16_without_replacement(&[], &mut to[written..], true);
        written += w;
        if matches!(result, EncoderResult::InputEmpty) {
            self.encoder = self.encoding.new_encoder();
            self.dirty = false;
        }
        Ok(written)
    }
}
