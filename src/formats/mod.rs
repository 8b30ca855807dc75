//! Format-specific conversion pipelines
//!
//! - `epub`: container unpacking, asset flattening and HTML rendering
//! - `office`: PPT/PPTX through an external headless converter

pub mod epub;
pub mod office;
