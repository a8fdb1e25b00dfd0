//! SQL-style LIKE / ILIKE matching over compiled, cached regexes.

pub mod pattern;

pub use pattern::{cached_regex, eval_ilike, eval_like};
