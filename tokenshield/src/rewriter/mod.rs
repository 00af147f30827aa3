//! Bidirectional request/response content rewriter (spec.md §4.4).

pub mod fields;
pub mod html;
pub mod json;

pub use fields::is_qualifying_field;
pub use html::detokenize_html;
pub use json::{detokenize_walk, tokenize_walk};
