pub mod add_text;
pub mod api;
pub mod bulk;
pub mod cache;
pub mod config;
pub mod family;
pub mod graph;
pub mod i18n;
pub mod prompt;
pub mod readtalk;
pub mod runtime;
pub mod tidy;
pub mod title;
pub mod tree;
pub mod welcome;
pub mod wikitext;

#[cfg(test)]
pub(crate) mod mock;
