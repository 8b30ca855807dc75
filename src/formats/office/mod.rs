//! PPT/PPTX to PDF through a headless office suite
//!
//! ## Requirements
//!
//! - LibreOffice (`libreoffice` or `soffice`) installed, or `OFFICE_BINARY`
//!   pointing at it

mod converter;

pub use converter::{profile_url, ExternalPdfConverter};
