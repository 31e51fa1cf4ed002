//! Encoding name normalization.

use std::collections::HashMap;

/// Maps user-supplied encoding names to canonical names.
pub trait AliasResolver: Send + Sync {
    /// Canonical name for `name`. Unknown names come back unchanged.
    fn alias(&self, name: &str) -> String;

    /// Whether `canonical` must be served by the system codec rather than a
    /// built-in or persisted converter.
    fn use_system_codec(&self, canonical: &str) -> bool;
}

/// Canonical names that always route through the system codec.
const SYSTEM_CODEC_ENCODINGS: &[&str] = &[
    "SJIS", "EUC_JP", "ISO2022JP", "EUC_KR", "GBK", "GB18030", "Big5", "KOI8_R",
];

/// The built-in alias table, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StandardAliases {
    extra: HashMap<String, String>,
}

impl StandardAliases {
    /// The built-in table only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias, overriding the built-in table for that name.
    pub fn with_alias(mut self, name: &str, canonical: impl Into<String>) -> Self {
        self.extra.insert(name.to_uppercase(), canonical.into());
        self
    }

    fn builtin(upper: &str) -> Option<&'static str> {
        ALIAS_TABLE
            .iter()
            .find(|(_, names)| names.contains(&upper))
            .map(|(canonical, _)| *canonical)
    }
}

/// `(canonical, names)` pairs; names are stored upper-case.
const ALIAS_TABLE: &[(&str, &[&str])] = &[
    ("Default", &["DEFAULT"]),
    // Unicode
    ("UTF8", &["UTF8", "UTF-8", "UTF_8"]),
    (
        "UnicodeBigUnmarked",
        &["UTF-16BE", "UTF16BE", "UTF_16BE", "X-UTF-16BE", "UNICODEBIGUNMARKED"],
    ),
    (
        "UnicodeLittleUnmarked",
        &["UTF-16LE", "UTF16LE", "UTF_16LE", "X-UTF-16LE", "UNICODELITTLEUNMARKED"],
    ),
    ("UnicodeBig", &["UTF-16", "UTF16", "UTF_16", "UNICODE", "UNICODEBIG"]),
    ("UnicodeLittle", &["UNICODELITTLE"]),
    // ASCII and Latin
    ("ASCII", &["ASCII", "US-ASCII", "US_ASCII", "ISO646-US", "646"]),
    (
        "8859_1",
        &[
            "8859_1", "ISO8859_1", "ISO88591", "ISO-8859-1", "ISO_8859-1", "LATIN1", "L1",
            "CP819", "IBM819",
        ],
    ),
    ("8859_2", &["8859_2", "ISO8859_2", "ISO88592", "ISO-8859-2", "LATIN2"]),
    ("8859_5", &["8859_5", "ISO8859_5", "ISO88595", "ISO-8859-5"]),
    ("8859_7", &["8859_7", "ISO8859_7", "ISO88597", "ISO-8859-7"]),
    ("8859_9", &["8859_9", "ISO8859_9", "ISO88599", "ISO-8859-9", "LATIN5"]),
    ("8859_15", &["8859_15", "ISO8859_15", "ISO885915", "ISO-8859-15", "LATIN9"]),
    // Windows code pages
    ("Cp1250", &["WINDOWS-1250", "WINDOWS1250", "WIN1250", "CP1250"]),
    ("Cp1251", &["WINDOWS-1251", "WINDOWS1251", "WIN1251", "CP1251"]),
    ("Cp1252", &["WINDOWS-1252", "WINDOWS1252", "WIN1252", "CP1252"]),
    ("Cp1253", &["WINDOWS-1253", "WINDOWS1253", "WIN1253", "CP1253"]),
    ("Cp1254", &["WINDOWS-1254", "WINDOWS1254", "WIN1254", "CP1254"]),
    // DOS/OEM
    ("Cp437", &["CP437", "IBM437", "DOS437"]),
    ("Cp850", &["CP850", "IBM850", "DOS850"]),
    ("Cp866", &["CP866", "IBM866", "DOS866"]),
    // Routed through the system codec
    ("SJIS", &["SHIFT_JIS", "SHIFT-JIS", "SHIFTJIS", "SJIS", "MS_KANJI"]),
    ("EUC_JP", &["EUC-JP", "EUC_JP", "EUCJP"]),
    ("ISO2022JP", &["ISO-2022-JP", "ISO2022JP", "ISO2022-JP"]),
    ("EUC_KR", &["EUC-KR", "EUC_KR", "EUCKR"]),
    ("GBK", &["GBK", "CP936"]),
    ("GB18030", &["GB18030"]),
    ("Big5", &["BIG5", "BIG-5", "CP950"]),
    ("KOI8_R", &["KOI8-R", "KOI8_R", "KOI8R"]),
];

/// Names the built-in table maps to `canonical`, upper-case.
pub fn aliases_of(canonical: &str) -> &'static [&'static str] {
    ALIAS_TABLE
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

impl AliasResolver for StandardAliases {
    fn alias(&self, name: &str) -> String {
        let upper = name.trim().to_uppercase();
        if let Some(canonical) = self.extra.get(&upper) {
            return canonical.clone();
        }
        Self::builtin(&upper)
            .map(str::to_owned)
            .unwrap_or_else(|| name.to_owned())
    }

    fn use_system_codec(&self, canonical: &str) -> bool {
        SYSTEM_CODEC_ENCODINGS.contains(&canonical)
    }
}
