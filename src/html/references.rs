//! Reference flattening for EPUB markup
//!
//! Assets are extracted into a single directory under their basenames, so
//! every `src`, `href` and namespaced `*:href` (e.g. `xlink:href`) attribute
//! is rewritten to the basename of its value. Absolute `http:`, `https:` and
//! `data:` values pass through untouched.
//!
//! Rewriting is structural (lol_html) rather than textual, so quoting style
//! and attribute order do not matter, and attributes that need no change are
//! emitted byte-for-byte as they appeared in the input.

use std::borrow::Cow;

use lol_html::{element, rewrite_str, RewriteStrSettings};

/// Value prefixes that are never rewritten
const PASSTHROUGH_PREFIXES: &[&str] = &["http:", "https:", "data:"];

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),
}

/// Whether an attribute carries a reference that follows asset flattening
pub fn is_reference_attribute(name: &str) -> bool {
    name.eq_ignore_ascii_case("src")
        || name.eq_ignore_ascii_case("href")
        || name
            .rsplit_once(':')
            .is_some_and(|(_, local)| local.eq_ignore_ascii_case("href"))
}

/// Map a single reference value onto the flattened layout
pub fn flatten_reference(value: &str) -> Cow<'_, str> {
    if PASSTHROUGH_PREFIXES.iter().any(|p| value.starts_with(p)) {
        return Cow::Borrowed(value);
    }

    let basename = value.rsplit('/').next().unwrap_or(value);
    if basename.len() == value.len() {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(basename.to_string())
    }
}

/// Rewrite every reference attribute in `html` to its flattened form
pub fn flatten_references(html: &str) -> Result<String, RewriteError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                let updates: Vec<(String, String)> = el
                    .attributes()
                    .iter()
                    .filter(|attr| is_reference_attribute(&attr.name()))
                    .filter_map(|attr| match flatten_reference(&attr.value()) {
                        Cow::Owned(flattened) => Some((attr.name(), flattened)),
                        Cow::Borrowed(_) => None,
                    })
                    .collect();

                for (name, value) in updates {
                    el.set_attribute(&name, &value)?;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))
}
