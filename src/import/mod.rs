//! Reading and cleaning Wikimedia dumps
//!
//! - [`wikimedia`]: streaming `<page>` extraction from (bzip2) MediaWiki XML
//! - [`transform`]: the per-record body transform seam
//! - [`wikitext`]: the default transform, MediaWiki markup to plaintext
//!
//! # Example Usage
//!
//! ```no_run
//! use wikiclean::import::{open_dump, NamespaceFilter, StreamExtractor, TextTransform, WikiTextCleaner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = open_dump("enwiki-latest-pages-articles.xml.bz2")?;
//! let cleaner = WikiTextCleaner::new();
//! let mut extractor = StreamExtractor::new(NamespaceFilter::default());
//!
//! extractor.extract(reader, |page| {
//!     let text = cleaner.apply(&page.body).unwrap_or_default();
//!     println!("{}: {} chars", page.key(), text.len());
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod source;
pub mod transform;
pub mod wikimedia;
pub mod wikitext;

pub use source::{CleanedRecord, DumpFormat, ParseError, RawRecord, TransformError};
pub use transform::{from_fn, FnTransform, Identity, TextTransform};
pub use wikimedia::{open_dump, Extraction, NamespaceFilter, StreamExtractor};
pub use wikitext::WikiTextCleaner;
