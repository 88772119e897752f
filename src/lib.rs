//! wikiclean: Wikipedia dump to plaintext store
//!
//! Streams a compressed MediaWiki XML dump through a bounded, cancellable
//! pipeline:
//! - page extraction with namespace filtering and redirect skipping
//! - wikitext cleaning on a pool of worker threads
//! - insert-if-absent persistence into a sled database
//! - periodic status reporting and orderly shutdown on Ctrl+C / SIGTERM

pub mod config;
pub mod import;
pub mod pipeline;
pub mod sink;

pub use config::Config;
