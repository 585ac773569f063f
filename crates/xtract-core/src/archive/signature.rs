//! Byte signatures used for format detection

use super::ArchiveFormat;

/// Offset of the ustar magic inside a tar header block
pub const TAR_MAGIC_OFFSET: usize = 257;

/// Where a signature must appear in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// At offset 0
    Prefix,
    /// At a fixed offset; the header must be longer than the offset
    Offset(usize),
}

/// A byte pattern plus its placement rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub tag: &'static str,
    pub bytes: &'static [u8],
    pub rule: MatchRule,
}

impl Signature {
    pub const fn prefix(tag: &'static str, bytes: &'static [u8]) -> Self {
        Self {
            tag,
            bytes,
            rule: MatchRule::Prefix,
        }
    }

    pub const fn at(tag: &'static str, offset: usize, bytes: &'static [u8]) -> Self {
        Self {
            tag,
            bytes,
            rule: MatchRule::Offset(offset),
        }
    }

    pub fn matches(&self, header: &[u8]) -> bool {
        match self.rule {
            MatchRule::Prefix => header.starts_with(self.bytes),
            MatchRule::Offset(offset) => {
                header.len() > offset && header[offset..].starts_with(self.bytes)
            }
        }
    }
}

pub const TAR: &[Signature] = &[
    Signature::at("ustar-posix", TAR_MAGIC_OFFSET, b"ustar\0"),
    Signature::at("ustar-gnu", TAR_MAGIC_OFFSET, b"ustar  \0"),
];

pub const GZIP: &[Signature] = &[Signature::prefix("gzip", &[0x1f, 0x8b])];

pub const BZIP2: &[Signature] = &[Signature::prefix("bzip2", b"BZh")];

pub const RAR: &[Signature] = &[
    Signature::prefix("rar-v4", b"Rar!\x1a\x07\x00"),
    Signature::prefix("rar-v5", b"Rar!\x1a\x07\x01\x00"),
];

pub const ZIP: &[Signature] = &[
    Signature::prefix("zip-local", b"PK\x03\x04"),
    Signature::prefix("zip-empty", b"PK\x05\x06"),
    Signature::prefix("zip-spanned", b"PK\x07\x08"),
];

/// Recognized but not extractable
pub const SEVEN_ZIP: &[Signature] = &[Signature::prefix("7z", &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c])];

/// Detection rule for one format
///
/// A rule with `inner` signatures is compound: the outer signatures must match
/// the raw header and the inner ones the decompressed header. A rule with
/// `exclude_inner` fails when the decompressed header matches those, so a
/// gzip-wrapped tar is never also plain gzip.
#[derive(Debug, Clone, Copy)]
pub struct FormatRule {
    pub format: ArchiveFormat,
    pub outer: &'static [Signature],
    pub inner: Option<&'static [Signature]>,
    pub exclude_inner: Option<&'static [Signature]>,
}

/// Rules in detection priority order; the first match wins
pub const RULES: &[FormatRule] = &[
    FormatRule {
        format: ArchiveFormat::Tar,
        outer: TAR,
        inner: None,
        exclude_inner: None,
    },
    FormatRule {
        format: ArchiveFormat::TarGz,
        outer: GZIP,
        inner: Some(TAR),
        exclude_inner: None,
    },
    FormatRule {
        format: ArchiveFormat::Gzip,
        outer: GZIP,
        inner: None,
        exclude_inner: Some(TAR),
    },
    FormatRule {
        format: ArchiveFormat::Rar,
        outer: RAR,
        inner: None,
        exclude_inner: None,
    },
    FormatRule {
        format: ArchiveFormat::Zip,
        outer: ZIP,
        inner: None,
        exclude_inner: None,
    },
    FormatRule {
        format: ArchiveFormat::Bzip2,
        outer: BZIP2,
        inner: None,
        exclude_inner: None,
    },
];

pub fn any_match(signatures: &[Signature], header: &[u8]) -> bool {
    signatures.iter().any(|signature| signature.matches(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_header(magic: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; 512];
        header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + magic.len()].copy_from_slice(magic);
        header
    }

    #[test]
    fn test_prefix_rules() {
        assert!(any_match(GZIP, &[0x1f, 0x8b, 0x08]));
        assert!(!any_match(GZIP, &[0x1f]));
        assert!(any_match(BZIP2, b"BZh91AY&SY"));
        assert!(any_match(RAR, b"Rar!\x1a\x07\x00\xcf"));
        assert!(any_match(RAR, b"Rar!\x1a\x07\x01\x00\x33"));
        assert!(!any_match(RAR, b"Rar!\x1a\x07\x02"));
        assert!(any_match(ZIP, b"PK\x05\x06\0\0"));
        assert!(any_match(SEVEN_ZIP, &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0, 4]));
    }

    #[test]
    fn test_tar_offset_rule() {
        assert!(any_match(TAR, &tar_header(b"ustar\0")));
        assert!(any_match(TAR, &tar_header(b"ustar  \0")));
        assert!(!any_match(TAR, &tar_header(b"nottar")));

        // Header shorter than the offset never matches
        assert!(!any_match(TAR, &[0u8; 100]));
        assert!(!any_match(TAR, &[0u8; TAR_MAGIC_OFFSET]));
    }

    #[test]
    fn test_rules_priority() {
        let order: Vec<_> = RULES.iter().map(|rule| rule.format).collect();
        assert_eq!(order, ArchiveFormat::DETECTION_ORDER);
    }
}
