//! Static mime table: maps a `u64` mime id to a `"type/subtype"` string and
//! back, and resolves a file extension to a known id. Unknown ids/extensions
//! for `BINARY` fall back to `application/octet-stream`.

/// `(id, extension, mime string)` rows of the static table. The id is the
/// value stored on the wire for a `BINARY` field; `BINARY_CUSTOM` instead
/// carries the mime name inline and never consults this table.
const TABLE: &[(u64, &str, &str)] = &[
    (0, "bin", "application/octet-stream"),
    (1, "txt", "text/plain"),
    (2, "json", "application/json"),
    (3, "html", "text/html"),
    (4, "css", "text/css"),
    (5, "js", "application/javascript"),
    (6, "png", "image/png"),
    (7, "jpg", "image/jpeg"),
    (8, "jpeg", "image/jpeg"),
    (9, "gif", "image/gif"),
    (10, "svg", "image/svg+xml"),
    (11, "pdf", "application/pdf"),
    (12, "xml", "application/xml"),
    (13, "csv", "text/csv"),
    (14, "zip", "application/zip"),
    (15, "wasm", "application/wasm"),
];

/// The id used for `application/octet-stream`, the fallback mime.
pub const OCTET_STREAM_ID: u64 = 0;

/// Resolve a file extension (without the leading dot, case-insensitive) to
/// a mime id. Returns [`OCTET_STREAM_ID`] if the extension is unknown.
#[must_use]
pub fn id_from_extension(ext: &str) -> u64 {
    TABLE
        .iter()
        .find(|(_, row_ext, _)| row_ext.eq_ignore_ascii_case(ext))
        .map_or(OCTET_STREAM_ID, |(id, _, _)| *id)
}

/// Resolve a mime id to its `"type/subtype"` string. Falls back to
/// `application/octet-stream` for unknown ids.
#[must_use]
pub fn name_from_id(id: u64) -> &'static str {
    TABLE
        .iter()
        .find(|(row_id, _, _)| *row_id == id)
        .map_or("application/octet-stream", |(_, _, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extension_resolves() {
        assert_eq!(id_from_extension("PNG"), 6);
        assert_eq!(name_from_id(6), "image/png");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(id_from_extension("xyz123"), OCTET_STREAM_ID);
        assert_eq!(name_from_id(9999), "application/octet-stream");
    }
}
