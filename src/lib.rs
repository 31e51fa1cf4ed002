//! # charset-encoder - Incremental Character-to-Byte Conversion
//!
//! Converts UTF-16 text into the bytes of a named target encoding, one chunk
//! at a time, and resolves encoding names to converters through a cached,
//! tiered registry.
//!
//! ## Features
//!
//! - **Incremental conversion** that survives surrogate pairs split across calls
//! - **Tiered resolution**: built-in converters, persisted code pages, then the
//!   `encoding_rs` codecs
//! - **Negative caching** so unsupported names are rejected without rework
//! - **Thread-safe** registry, shareable behind an `Arc`
//!
//! ## Quick Start
//!
//! ```rust
//! use charset_encoder::{Converter, Registry};
//!
//! let registry = Registry::default();
//! let mut conv = registry.resolve("utf-8").unwrap();
//!
//! // U+1F600 arrives split across two calls
//! let units: Vec<u16> = "hi \u{1F600}".encode_utf16().collect();
//! let mut out = vec![0u8; 16];
//! let mut n = conv.convert(&units[..4], &mut out).unwrap();
//! n += conv.convert(&units[4..], &mut out[n..]).unwrap();
//! n += conv.flush(&mut out[n..]).unwrap();
//!
//! assert_eq!(&out[..n], "hi \u{1F600}".as_bytes());
//! ```

#![deny(missing_docs)]

pub mod alias;
pub mod codecs;
pub mod config;
pub mod converter;
pub mod registry;
pub mod store;
pub mod system;

pub use alias::{AliasResolver, StandardAliases};
pub use codecs::{Builtin, CharEncoder, CharToByte};
pub use config::Config;
pub use converter::{CarryBuffer, Converter, pending_bytes};
pub use registry::{ConverterFactory, Registry, RegistryBuilder, Tier};
pub use store::{DirectoryStore, EmptyStore, MemoryStore, PersistedConverter, ResourceStore};
pub use system::{EncodingRsCodec, SystemCodec, SystemConverter};

/// Result type for conversion and resolution
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting or resolving
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Character cannot be encoded in the target encoding
    #[error("cannot encode character {character:?} at position {position}")]
    UnmappableTarget {
        /// The unmappable character
        character: char,
        /// Index of its first code unit in the input
        position: usize,
    },
    /// Unpaired surrogate in the input
    #[error("unpaired surrogate 0x{unit:04X} at position {position}")]
    MalformedInput {
        /// The offending code unit
        unit: u16,
        /// Its index in the input
        position: usize,
    },
    /// No tier can provide a converter for the name
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    /// A converter could not be constructed right now
    #[error("cannot construct converter for {encoding}: {reason}")]
    Construction {
        /// Canonical encoding name
        encoding: String,
        /// What went wrong
        reason: String,
    },
    /// A persisted converter resource is malformed
    #[error("invalid resource {path}: {reason}")]
    InvalidResource {
        /// Resource path in the store
        path: String,
        /// What is wrong with it
        reason: String,
    },
    /// Invalid input data
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Drives a converter over a sequence of input chunks, sizing each output
/// buffer from [`Converter::number_of_bytes`].
pub struct StreamingEncoder {
    converter: Box<dyn Converter>,
    units_in: usize,
    bytes_out: usize,
}

impl StreamingEncoder {
    /// Wrap `converter`.
    pub fn new(converter: Box<dyn Converter>) -> Self {
        Self {
            converter,
            units_in: 0,
            bytes_out: 0,
        }
    }

    /// Canonical name of the target encoding.
    pub fn encoding(&self) -> &str {
        self.converter.encoding()
    }

    /// Convert a chunk of code units. A chunk may end in the middle of a
    /// surrogate pair; the high half is held until the next chunk.
    pub fn process_chunk(&mut self, chunk: &[u16]) -> Result<Vec<u8>> {
        let mut joined = self.converter.carry_buffer().as_slice().to_vec();
        joined.extend_from_slice(chunk);

        let mut out = vec![0u8; self.converter.number_of_bytes(&joined)];
        let n = self.converter.convert(chunk, &mut out)?;
        out.truncate(n);

        self.units_in += chunk.len();
        self.bytes_out += n;
        Ok(out)
    }

    /// Flush whatever is still carried, end the stream and return the
    /// converter.
    pub fn finish(mut self) -> Result<(Vec<u8>, Box<dyn Converter>)> {
        // Room for the carried units plus a stateful encoder's reset sequence.
        let mut out = vec![0u8; pending_bytes(self.converter.as_ref()) + 8];
        let n = self.converter.finish(&mut out)?;
        out.truncate(n);
        self.bytes_out += n;
        Ok((out, self.converter))
    }

    /// Code units fed so far.
    pub fn units_in(&self) -> usize {
        self.units_in
    }

    /// Bytes produced so far.
    pub fn bytes_out(&self) -> usize {
        self.bytes_out
    }
}

/// Encode a whole string with a fresh converter for `encoding`.
pub fn encode_str(registry: &Registry, encoding: &str, text: &str) -> Result<Vec<u8>> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut stream = StreamingEncoder::new(registry.resolve(encoding)?);
    let mut bytes = stream.process_chunk(&units)?;
    let (tail, _) = stream.finish()?;
    bytes.extend(tail);
    Ok(bytes)
}
