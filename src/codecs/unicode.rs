//! Unicode transformation formats: UTF-8 and UTF-16 in both byte orders.

use super::CharEncoder;

/// UTF-8, 1 to 4 bytes per character.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl CharEncoder for Utf8 {
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize> {
        Some(c.encode_utf8(out).len())
    }
}

/// UTF-16, two bytes per code unit, optionally preceded by a byte order mark.
#[derive(Debug, Clone, Copy)]
pub struct Utf16 {
    big_endian: bool,
    bom: bool,
}

impl Utf16 {
    /// Big-endian output; `bom` selects whether `FE FF` starts the stream.
    pub fn big_endian(bom: bool) -> Self {
        Self {
            big_endian: true,
            bom,
        }
    }

    /// Little-endian output; `bom` selects whether `FF FE` starts the stream.
    pub fn little_endian(bom: bool) -> Self {
        Self {
            big_endian: false,
            bom,
        }
    }
}

impl CharEncoder for Utf16 {
    fn encode_char(&self, c: char, out: &mut [u8; 4]) -> Option<usize> {
        let mut code_units = [0u16; 2];
        let code_units = c.encode_utf16(&mut code_units);
        for (i, unit) in code_units.iter().enumerate() {
            let bytes = if self.big_endian {
                unit.to_be_bytes()
            } else {
                unit.to_le_bytes()
            };
            out[i * 2..i * 2 + 2].copy_from_slice(&bytes);
        }
        Some(code_units.len() * 2)
    }

    fn preamble(&self) -> &[u8] {
        match (self.bom, self.big_endian) {
            (false, _) => &[],
            (true, true) => &[0xFE, 0xFF],
            (true, false) => &[0xFF, 0xFE],
        }
    }
}
