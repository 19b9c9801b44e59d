use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

fn detect_encoding(buffer: &[u8]) -> &'static Encoding {
    if buffer.starts_with(&[0xFF, 0xFE]) || buffer.starts_with(&[0xFE, 0xFF]) {
        // UTF-16 BOM; decode as UTF-8 fallback
        return UTF_8;
    }

    if std::str::from_utf8(buffer).is_ok() {
        return UTF_8;
    }

    // Legacy console code page
    WINDOWS_1252
}

/// Decodes one line of child-process console output.
pub fn decode_console_line(buffer: &[u8]) -> String {
    let (cow, _, had_errors) = detect_encoding(buffer).decode(buffer);
    if had_errors {
        log::warn!("console output contained invalid characters");
    }
    cow.trim_end_matches(['\r', '\n']).to_string()
}
