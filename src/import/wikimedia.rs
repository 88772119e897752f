//! Wikimedia XML dump extractor
//!
//! Streams a MediaWiki XML export (optionally bzip2 compressed) event by event
//! and reconstructs one [`RawRecord`] per `<page>`. Only the page currently
//! being read is held in memory.

use super::source::{DumpFormat, ParseError, RawRecord};
use crate::pipeline::channel::ChannelError;
use crate::pipeline::metrics::PipelineCounters;
use bzip2::read::MultiBzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Open a dump file for streaming, decompressing `.bz2` files on the fly
pub fn open_dump(path: impl AsRef<Path>) -> Result<Box<dyn BufRead + Send>, ParseError> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let reader: Box<dyn BufRead + Send> = match DumpFormat::detect(path) {
        // Multistream dumps are concatenated bzip2 streams
        DumpFormat::Bzip2Xml => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            MultiBzDecoder::new(file),
        )),
        DumpFormat::PlainXml => Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)),
    };

    debug!("Opened dump {} as {:?}", path.display(), DumpFormat::detect(path));
    Ok(reader)
}

/// Predicate over a page's namespace
#[derive(Clone)]
pub enum NamespaceFilter {
    /// Accept every page
    Any,
    /// Accept pages whose namespace is in the set. Pages without a namespace
    /// are rejected.
    Only(HashSet<i32>),
    /// Caller-supplied predicate
    Custom(Arc<dyn Fn(Option<i32>) -> bool + Send + Sync>),
}

impl NamespaceFilter {
    pub fn only(namespaces: impl IntoIterator<Item = i32>) -> Self {
        NamespaceFilter::Only(namespaces.into_iter().collect())
    }

    pub fn custom(predicate: impl Fn(Option<i32>) -> bool + Send + Sync + 'static) -> Self {
        NamespaceFilter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, namespace: Option<i32>) -> bool {
        match self {
            NamespaceFilter::Any => true,
            NamespaceFilter::Only(allowed) => namespace.is_some_and(|ns| allowed.contains(&ns)),
            NamespaceFilter::Custom(predicate) => predicate(namespace),
        }
    }
}

impl Default for NamespaceFilter {
    /// Main (article) namespace only
    fn default() -> Self {
        NamespaceFilter::only([0])
    }
}

impl fmt::Debug for NamespaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceFilter::Any => f.write_str("Any"),
            NamespaceFilter::Only(allowed) => {
                let mut sorted: Vec<_> = allowed.iter().collect();
                sorted.sort();
                f.debug_tuple("Only").field(&sorted).finish()
            }
            NamespaceFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How an extraction run ended. Each variant carries the emitted count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// The byte stream was exhausted
    Completed(u64),
    /// The configured page limit was reached
    LimitReached(u64),
    /// Cancelled, or the downstream channel refused a record
    Interrupted(u64),
}

impl Extraction {
    pub fn records(&self) -> u64 {
        match *self {
            Extraction::Completed(n) | Extraction::LimitReached(n) | Extraction::Interrupted(n) => n,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Extraction::Interrupted(_))
    }
}

/// Elements whose content or nesting the extractor tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Page,
    Title,
    Namespace,
    Text,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"page" => Some(Field::Page),
            b"title" => Some(Field::Title),
            b"ns" => Some(Field::Namespace),
            b"text" => Some(Field::Text),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Field::Page => "page",
            Field::Title => "title",
            Field::Namespace => "ns",
            Field::Text => "text",
        }
    }
}

/// Transient state for the page being read
#[derive(Debug, Default)]
struct ParseContext {
    /// Open tracked elements, innermost last
    stack: Vec<Field>,
    title: Option<String>,
    /// Raw namespace text, parsed only when the page is emitted
    namespace: Option<String>,
    text: Option<String>,
    redirect: bool,
}

impl ParseContext {
    fn open(&mut self, field: Field) {
        match field {
            Field::Page => {
                self.title = None;
                self.namespace = None;
                self.text = None;
                self.redirect = false;
            }
            Field::Title => self.title = Some(String::new()),
            Field::Namespace => self.namespace = Some(String::new()),
            Field::Text => self.text = Some(String::new()),
        }
        self.stack.push(field);
    }

    /// Pop only when `field` is innermost; overlapping markup leaves the stack alone
    fn close(&mut self, field: Field) {
        if self.stack.last() == Some(&field) {
            self.stack.pop();
        }
    }

    fn append(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        let target = match self.stack.last() {
            Some(Field::Title) => self.title.as_mut(),
            Some(Field::Namespace) => self.namespace.as_mut(),
            Some(Field::Text) => self.text.as_mut(),
            Some(Field::Page) | None => None,
        };
        if let Some(target) = target {
            target.push_str(content);
        }
    }

    fn parsed_namespace(&self) -> Result<Option<i32>, ParseError> {
        let Some(raw) = self.namespace.as_deref() else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| ParseError::InvalidNamespace {
                value: trimmed.to_string(),
                title: self.title.clone(),
            })
    }

    fn open_page(&self) -> bool {
        self.stack.contains(&Field::Page)
    }
}

/// Incremental, depth-tracked extractor for MediaWiki XML exports
pub struct StreamExtractor {
    filter: NamespaceFilter,
    skip_redirects: bool,
    max_pages: Option<u64>,
    counters: Arc<PipelineCounters>,
    cancel: Arc<AtomicBool>,
}

impl StreamExtractor {
    pub fn new(filter: NamespaceFilter) -> Self {
        Self {
            filter,
            skip_redirects: false,
            max_pages: None,
            counters: PipelineCounters::shared(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drop pages that contain a `<redirect>` element
    pub fn with_skip_redirects(mut self, skip: bool) -> Self {
        self.skip_redirects = skip;
        self
    }

    /// Stop after emitting this many records
    pub fn with_max_pages(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Report emissions into shared pipeline counters
    pub fn with_counters(mut self, counters: Arc<PipelineCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Stop reading once `cancel` is raised, even while no page is accepted
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }

    /// Stream `reader`, calling `emit` for each accepted page.
    ///
    /// A failing `emit` or a raised cancel flag stops extraction and yields
    /// [`Extraction::Interrupted`].
    /// Malformed input yields a [`ParseError`]; the page being read at that
    /// point is never emitted.
    pub fn extract<R, E>(&mut self, reader: R, mut emit: E) -> Result<Extraction, ParseError>
    where
        R: BufRead,
        E: FnMut(RawRecord) -> Result<(), ChannelError>,
    {
        let mut reader = Reader::from_reader(reader);
        {
            let config = reader.config_mut();
            config.expand_empty_elements = true;
            config.check_end_names = false;
        }

        let mut ctx = ParseContext::default();
        let mut buf = Vec::with_capacity(8192);
        let mut emitted = 0u64;

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Extraction cancelled after {} records", emitted);
                return Ok(Extraction::Interrupted(emitted));
            }

            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| xml_error(e, reader.buffer_position() as u64))?;

            match event {
                Event::Start(ref e) => {
                    let name = e.local_name();
                    if let Some(field) = Field::from_tag(name.as_ref()) {
                        ctx.open(field);
                    } else if name.as_ref() == b"redirect" {
                        ctx.redirect = true;
                    }
                }
                Event::Text(ref e) if !ctx.stack.is_empty() => {
                    let text = e.unescape().map_err(|err| ParseError::Encoding {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    ctx.append(&text);
                }
                Event::CData(ref e) => {
                    let text = std::str::from_utf8(e).map_err(|err| ParseError::Encoding {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    ctx.append(text);
                }
                Event::End(ref e) => {
                    let field = Field::from_tag(e.local_name().as_ref());
                    if let Some(field) = field {
                        ctx.close(field);
                    }

                    if field == Some(Field::Page) {
                        if let Some(record) = self.finish_page(&mut ctx)? {
                            if emit(record).is_err() {
                                info!("Extraction interrupted after {} records", emitted);
                                return Ok(Extraction::Interrupted(emitted));
                            }
                            emitted += 1;
                            self.counters.extracted.inc();

                            if self.max_pages.is_some_and(|max| emitted >= max) {
                                info!("Reached page limit: {}", emitted);
                                return Ok(Extraction::LimitReached(emitted));
                            }
                        }
                    }
                }
                Event::Eof => {
                    if ctx.open_page() {
                        return Err(ParseError::Truncated {
                            open: Field::Page.tag().to_string(),
                        });
                    }
                    debug!("Reached end of dump after {} records", emitted);
                    return Ok(Extraction::Completed(emitted));
                }
                _ => {}
            }

            buf.clear();
        }
    }

    /// Turn the just-closed page into a record if it qualifies
    fn finish_page(&self, ctx: &mut ParseContext) -> Result<Option<RawRecord>, ParseError> {
        if ctx.text.is_none() {
            return Ok(None);
        }

        let namespace = ctx.parsed_namespace()?;
        if !self.filter.matches(namespace) {
            return Ok(None);
        }
        if self.skip_redirects && ctx.redirect {
            return Ok(None);
        }

        Ok(Some(RawRecord {
            identifier: ctx.title.take(),
            namespace,
            body: ctx.text.take().unwrap_or_default(),
        }))
    }
}

fn xml_error(error: quick_xml::Error, position: u64) -> ParseError {
    match error {
        quick_xml::Error::Io(io) => ParseError::Io(std::io::Error::new(io.kind(), io.to_string())),
        other => ParseError::Xml {
            position,
            message: other.to_string(),
        },
    }
}
