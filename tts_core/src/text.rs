use unicode_normalization::UnicodeNormalization;

/// NFC-normalize and trim request text before it reaches an engine.
///
/// Composed form keeps accented input ("Olá" typed with a combining acute)
/// identical to its precomposed spelling, so both hit the same cache entry.
pub fn normalize_text(raw: &str) -> String {
    raw.nfc().collect::<String>().trim().to_string()
}
