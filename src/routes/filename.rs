//! Upload filename sanitizing

use crate::convert::DocumentKind;

/// Stem used when nothing of the original name survives sanitizing
pub const FALLBACK_STEM: &str = "document";

/// Reduce an uploaded name to a safe `<stem>.<ext>`.
///
/// The stem keeps ASCII alphanumerics, `.`, `_` and `-`; whitespace and path
/// separators become `_`; leading and trailing dots and underscores are
/// dropped. The extension always comes from the validated `kind`.
pub fn sanitize_file_name(original: &str, kind: DocumentKind) -> String {
    format!("{}.{}", sanitize_stem(original), kind.extension())
}

/// Name offered for the converted download
pub fn download_name(original: &str) -> String {
    format!("{}.pdf", sanitize_stem(original))
}

fn sanitize_stem(original: &str) -> String {
    let stem = original
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(original);

    let spaced = stem.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}
