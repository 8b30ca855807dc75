//! Vellum Server Library
//!
//! Document-to-PDF conversion behind a small HTTP surface.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `convert`: request/outcome types and the dispatcher
//! - `formats`: the EPUB (MuPDF) and PPT/PPTX (headless office) pipelines
//! - `probe`: capability registry backing `/health`
//! - `routes`: HTTP endpoints

pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod html;
pub mod probe;
pub mod process;
pub mod routes;
pub mod state;
pub mod workspace;

#[cfg(test)]
mod test_support;
