//! HTML processing module
//!
//! Markup manipulation for EPUB content:
//! - Reference flattening (`src`, `href`, `xlink:href`)
//! - Assembly of the combined document handed to the PDF engine
//!
//! Uses lol_html for efficient streaming HTML processing.

mod references;

pub use references::{flatten_reference, flatten_references, is_reference_attribute, RewriteError};

/// Stylesheet applied to every rendered EPUB
pub const BOOK_STYLESHEET: &str = r#"
@page { size: A4; margin: 2cm; }
body {
    font-family: "Helvetica Neue", Helvetica, Arial, "Noto Sans", "Microsoft YaHei", sans-serif;
    font-size: 11pt;
    line-height: 1.6;
}
img {
    display: block;
    max-width: 100%;
    height: auto;
    margin: 1em auto;
}
title, script { display: none; }
"#;

/// Wrap already-rewritten documents into one HTML file, in the given order
pub fn combine_documents<'a, I>(title: &str, documents: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<title>");
    html.push_str(&html_escape::encode_text(title));
    html.push_str("</title>\n<style>");
    html.push_str(BOOK_STYLESHEET);
    html.push_str("</style>\n</head>\n<body>\n");
    for doc in documents {
        html.push_str(doc);
        html.push('\n');
    }
    html.push_str("</body>\n</html>\n");
    html
}
