//! Single-byte encodings: ASCII, Latin-1 and table-driven code pages.

use std::collections::HashMap;
use std::sync::Arc;

use super::CharEncoder;
use crate::{Error, Result};

/// US-ASCII, characters `U+0000..=U+007F`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii;

impl CharEncoder for Ascii {
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize> {
        if c.is_ascii() {
            out[0] = c as u8;
            Some(1)
        } else {
            None
        }
    }
}

/// ISO-8859-1, characters `U+0000..=U+00FF`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl CharEncoder for Latin1 {
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize> {
        u8::try_from(c).ok().map(|b| {
            out[0] = b;
            1
        })
    }
}

/// Single-byte code page described by a byte-to-character table.
///
/// Built from the 256-entry table of a persisted converter; the table is
/// inverted once into a character-to-byte lookup shared by clones.
#[derive(Debug, Clone)]
pub struct TableEncoder {
    lookup: Arc<HashMap<char, u8>>,
}

impl TableEncoder {
    /// Build the reverse lookup from `table[byte] = character`.
    ///
    /// The table must have exactly 256 entries. When two bytes map to the same
    /// character the lower byte wins.
    pub fn from_table(table: &[Option<char>]) -> Result<Self> {
        if table.len() != 256 {
            return Err(Error::InvalidInput(format!(
                "code page table must have 256 entries, found {}",
                table.len()
            )));
        }

        let mut lookup = HashMap::new();
        for (byte, &ch_opt) in table.iter().enumerate() {
            if let Some(ch) = ch_opt {
                lookup.entry(ch).or_insert(byte as u8);
            }
        }

        Ok(Self {
            lookup: Arc::new(lookup),
        })
    }

    /// Number of characters this code page can encode.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Whether the code page encodes no characters at all.
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

impl CharEncoder for TableEncoder {
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize> {
        self.lookup.get(&c).map(|&b| {
            out[0] = b;
            1
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(encoder: &impl CharEncoder, c: char) -> Option<u8> {
        let mut out = [0u8; 4];
        encoder.encode_char(c, &mut out).map(|_| out[0])
    }

    #[test]
    fn test_ascii_range() {
        assert_eq!(encode(&Ascii, 'A'), Some(0x41));
        assert_eq!(encode(&Ascii, '\u{7F}'), Some(0x7F));
        assert_eq!(encode(&Ascii, '\u{80}'), None);
    }

    #[test]
    fn test_latin1_range() {
        assert_eq!(encode(&Latin1, '\u{A9}'), Some(0xA9));
        assert_eq!(encode(&Latin1, '\u{FF}'), Some(0xFF));
        assert_eq!(encode(&Latin1, '\u{20AC}'), None);
    }

    #[test]
    fn test_table_encoder_inverts_table() {
        // ISO-8859-15 differs from Latin-1 at 0xA4 (Euro)
        let mut table: Vec<Option<char>> = (0u8..=255).map(|b| Some(b as char)).collect();
        table[0xA4] = Some('\u{20AC}');
        table[0x81] = None;

        let encoder = TableEncoder::from_table(&table).unwrap();
        assert_eq!(encode(&encoder, '\u{20AC}'), Some(0xA4));
        assert_eq!(encode(&encoder, '\u{A4}'), None);
        assert_eq!(encode(&encoder, '\u{81}'), None);
        assert_eq!(encode(&encoder, 'z'), Some(b'z'));
        assert_eq!(encoder.len(), 255);
    }

    #[test]
    fn test_table_encoder_rejects_wrong_length() {
        let err = TableEncoder::from_table(&[Some('a'); 10]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
