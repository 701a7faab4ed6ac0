//! ZIP binary format constants and field-level helpers shared by the reader
//! and the serializer.

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_SIG: u32 = 0x0403_4b50;
/// Central directory file header signature (`PK\x01\x02`).
pub const CENTRAL_SIG: u32 = 0x0201_4b50;
/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIG: u32 = 0x0605_4b50;

/// Fixed byte length of a local file header, excluding name/extra/data.
pub const LOCAL_LEN: u64 = 30;
/// Fixed byte length of a central directory header, excluding variable parts.
pub const CENTRAL_LEN: u64 = 46;
/// Fixed byte length of the end of central directory record, excluding comment.
pub const EOCD_LEN: usize = 22;

/// Compression method id for stored (uncompressed) entries.
pub const METHOD_STORED: u16 = 0;
/// Compression method id for deflated entries.
pub const METHOD_DEFLATED: u16 = 8;

/// Earliest DOS time the format can represent, used when removing timestamps.
pub const EARLIEST_TIME: u16 = 0x6020;
/// Earliest DOS date the format can represent, used when removing timestamps.
pub const EARLIEST_DATE: u16 = 0x0021;

/// Minimum "version needed to extract" for deflated entries (2.0).
pub const VERSION_DEFLATE: u16 = 20;

/// General purpose flag bit 3: sizes/CRC follow the data in a descriptor.
/// The serializer always knows sizes up front, so this bit is always cleared.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Sentinel written to central size fields when masking is enabled.
pub const SIZE_SENTINEL: u32 = u32::MAX;

/// Extra field id marking an archive as executable on some hosts.
pub const EXEC_MARKER_ID: u16 = 0xCAFE;

/// The conventional manifest directory entry name.
pub const MANIFEST_DIR: &[u8] = b"META-INF/";
/// The conventional manifest file name.
pub const MANIFEST_PATH: &[u8] = b"META-INF/MANIFEST.MF";

/// Checks whether an entry name is the manifest file or its directory.
#[must_use]
pub fn is_manifest(name: &[u8]) -> bool {
    name == MANIFEST_PATH || name == MANIFEST_DIR
}

/// Checks whether an entry name suggests a nested archive.
#[must_use]
pub fn is_zip_like(name: &[u8]) -> bool {
    name.ends_with(b".jar") || name.ends_with(b".zip")
}

/// Walks the `[id, len, data]` records of an extra field, checking for `id`.
/// A malformed trailer is treated as not containing the id.
#[must_use]
pub fn extra_has_id(extra: &[u8], id: u16) -> bool {
    let mut rest = extra;
    while let [a, b, c, d, tail @ ..] = rest {
        if u16::from_le_bytes([*a, *b]) == id {
            return true;
        }
        let len = u16::from_le_bytes([*c, *d]) as usize;
        if len > tail.len() {
            return false;
        }
        rest = &tail[len..];
    }
    false
}

/// The 4-byte executable marker record: id `0xCAFE` with an empty payload.
#[must_use]
pub const fn exec_marker() -> [u8; 4] {
    let id = EXEC_MARKER_ID.to_le_bytes();
    [id[0], id[1], 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_id_walk() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x5455u16.to_le_bytes());
        extra.extend_from_slice(&5u16.to_le_bytes());
        extra.extend_from_slice(&[1, 2, 3, 4, 5]);
        extra.extend_from_slice(&exec_marker());
        assert!(extra_has_id(&extra, 0x5455));
        assert!(extra_has_id(&extra, EXEC_MARKER_ID));
        assert!(!extra_has_id(&extra, 0x0001));
    }

    #[test]
    fn extra_id_malformed() {
        // Declared length runs past the end of the field.
        let extra = [0xFE, 0xCA, 0xFF, 0x00, 1, 2];
        assert!(!extra_has_id(&extra, 0x0001));
        assert!(extra_has_id(&extra, EXEC_MARKER_ID));
    }

    #[test]
    fn manifest_names() {
        assert!(is_manifest(b"META-INF/MANIFEST.MF"));
        assert!(is_manifest(b"META-INF/"));
        assert!(!is_manifest(b"META-INF/services/x"));
        assert!(is_zip_like(b"libs/inner.jar"));
        assert!(!is_zip_like(b"a.class"));
    }
}
