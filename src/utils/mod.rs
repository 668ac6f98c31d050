//! Utilities module
//!
//! Contains error handling, tokenization, and report rendering

pub mod error;
pub mod report;
pub mod tokenizer;
