//! Integration tests for wikiclean
//!
//! These tests run the full pipeline: extractor, worker pool, writer and
//! supervisor, against in-memory and sled sinks.

use bzip2::write::BzEncoder;
use bzip2::Compression;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wikiclean::{
    config::PipelineConfig,
    import::{
        from_fn, open_dump, Identity, NamespaceFilter, ParseError, StreamExtractor, TextTransform,
        TransformError, WikiTextCleaner,
    },
    pipeline::{PipelineError, PipelineState, RunOutcome, RunReport, Supervisor},
    sink::{MemorySink, Sink, SinkError, SledSink},
};

fn page(title: &str, ns: i32, text: &str) -> String {
    format!(
        "<page><title>{}</title><ns>{}</ns><id>1</id><revision><text xml:space=\"preserve\">{}</text></revision></page>",
        title, ns, text
    )
}

fn dump(pages: &[String]) -> String {
    format!(
        "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\"><siteinfo><sitename>Test</sitename></siteinfo>{}</mediawiki>",
        pages.concat()
    )
}

fn config(workers: usize, capacity: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        input_capacity: capacity,
        output_capacity: capacity,
        monitor_interval_ms: 50,
        ..PipelineConfig::default()
    }
}

fn run_memory(
    xml: &str,
    pipeline: PipelineConfig,
    filter: NamespaceFilter,
    transform: Arc<dyn TextTransform>,
) -> (RunReport, MemorySink) {
    let sink = MemorySink::new();
    let supervisor = Supervisor::new(pipeline, StreamExtractor::new(filter), transform, Box::new(sink.clone()));
    let report = supervisor.run(Cursor::new(xml.as_bytes().to_vec()));
    (report, sink)
}

/// Endless stream of pages in a single namespace
struct EndlessDump {
    pending: Vec<u8>,
    pos: usize,
    next: u64,
    namespace: i32,
}

impl EndlessDump {
    fn new() -> Self {
        Self::with_namespace(0)
    }

    fn with_namespace(namespace: i32) -> Self {
        Self {
            pending: b"<mediawiki>".to_vec(),
            pos: 0,
            next: 0,
            namespace,
        }
    }
}

impl Read for EndlessDump {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.pending.len() {
            self.pending = page(&format!("Page {}", self.next), self.namespace, &format!("body {}", self.next)).into_bytes();
            self.pos = 0;
            self.next += 1;
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn test_namespace_filter_end_to_end() {
    let xml = dump(&[page("A", 0, "alpha"), page("Talk:A", 1, "chatter"), page("B", 0, "beta")]);
    let (report, sink) = run_memory(&xml, config(3, 4), NamespaceFilter::only([0]), Arc::new(Identity));

    assert!(report.is_success());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.get("A").as_deref(), Some("alpha"));
    assert_eq!(sink.get("B").as_deref(), Some("beta"));
    assert_eq!(sink.get("Talk:A"), None);
    assert_eq!(report.stats.extracted, 2);
    assert_eq!(report.stats.written, 2);
}

#[test]
fn test_duplicate_titles_keep_first_value() {
    let xml = dump(&[page("Dup", 0, "A"), page("Dup", 0, "B")]);
    // One worker keeps the order deterministic
    let (report, sink) = run_memory(&xml, config(1, 4), NamespaceFilter::default(), Arc::new(Identity));

    assert!(report.is_success());
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.get("Dup").as_deref(), Some("A"));
    assert_eq!(report.stats.written, 1);
    assert_eq!(report.stats.duplicates, 1);
}

#[test]
fn test_every_page_stored_once_for_any_worker_count() {
    let pages: Vec<String> = (0..300)
        .map(|i| page(&format!("Page {}", i), i % 3, &format!("'''Body''' {}", i)))
        .collect();
    let xml = dump(&pages);

    for workers in [1, 2, 7, 16] {
        let (report, sink) = run_memory(
            &xml,
            config(workers, 8),
            NamespaceFilter::only([0, 1]),
            Arc::new(WikiTextCleaner::new()),
        );

        assert!(report.is_success(), "workers={}: {:?}", workers, report.outcome);
        assert_eq!(report.stats.extracted, 200, "workers={}", workers);
        assert_eq!(report.stats.transformed, 200, "workers={}", workers);
        assert_eq!(report.stats.written, 200, "workers={}", workers);
        assert_eq!(sink.len(), 200, "workers={}", workers);
        assert_eq!(sink.get("Page 3").as_deref(), Some("Body 3"));
        assert_eq!(sink.close_calls(), 1);
    }
}

#[test]
fn test_transform_failures_are_counted_and_skipped() {
    let xml = dump(&[page("Good", 0, "ok"), page("Bad", 0, "corrupt"), page("Fine", 0, "ok too")]);
    let transform = from_fn(|body: &str| {
        if body == "corrupt" {
            Err(TransformError::new("cannot clean"))
        } else {
            Ok(body.to_string())
        }
    });
    let (report, sink) = run_memory(&xml, config(2, 4), NamespaceFilter::default(), Arc::new(transform));

    assert!(report.is_success());
    assert_eq!(report.stats.transform_failed, 1);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.get("Bad"), None);
}

#[test]
fn test_max_pages_is_a_normal_completion() {
    let pages: Vec<String> = (0..50).map(|i| page(&format!("P{}", i), 0, "x")).collect();
    let sink = MemorySink::new();
    let extractor = StreamExtractor::new(NamespaceFilter::default()).with_max_pages(Some(10));
    let supervisor = Supervisor::new(config(4, 4), extractor, Arc::new(Identity), Box::new(sink.clone()));
    let report = supervisor.run(Cursor::new(dump(&pages)));

    assert!(report.is_success());
    assert_eq!(report.stats.extracted, 10);
    assert_eq!(sink.len(), 10);
}

#[test]
fn test_parse_error_fails_run_and_closes_sink() {
    let xml = format!(
        "<mediawiki>{}<page><title>Bad</title><ns>zero</ns><text>x</text></page></mediawiki>",
        page("Ok", 0, "fine")
    );
    let (report, sink) = run_memory(&xml, config(2, 4), NamespaceFilter::default(), Arc::new(Identity));

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(
        report.error(),
        Some(PipelineError::Parse(ParseError::InvalidNamespace { .. }))
    ));
    assert_eq!(report.stats.extracted, 1);
    assert_eq!(sink.close_calls(), 1);
}

#[test]
fn test_sink_failure_fails_run() {
    let pages: Vec<String> = (0..100).map(|i| page(&format!("P{}", i), 0, "x")).collect();
    let sink = MemorySink::new().fail_after(5);
    let supervisor = Supervisor::new(
        config(4, 2),
        StreamExtractor::new(NamespaceFilter::default()),
        Arc::new(Identity),
        Box::new(sink.clone()),
    );
    let report = supervisor.run(Cursor::new(dump(&pages)));

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.error(), Some(PipelineError::Sink(SinkError::Rejected(_)))));
    assert_eq!(sink.len(), 5);
    assert_eq!(report.stats.written, 5);
    assert_eq!(sink.close_calls(), 1);
}

#[test]
fn test_cancellation_stops_endless_input() {
    let sink = MemorySink::new();
    let slow = from_fn(|body: &str| {
        thread::sleep(Duration::from_millis(1));
        Ok(body.to_string())
    });
    let supervisor = Supervisor::new(
        config(4, 16),
        StreamExtractor::new(NamespaceFilter::default()),
        Arc::new(slow),
        Box::new(sink.clone()),
    );
    let cancel = supervisor.cancel_handle();

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            assert!(cancel.cancel());
        })
    };

    let start = Instant::now();
    let report = supervisor.run(BufReader::new(EndlessDump::new()));
    canceller.join().unwrap();

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(report.exit_code(), 130);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(cancel.state(), PipelineState::Stopped);
    assert!(!cancel.cancel());
    assert!(report.stats.extracted > 0);
    assert!(sink.len() as u64 <= report.stats.transformed);
    assert_eq!(sink.close_calls(), 1);
}

#[test]
fn test_cancellation_while_every_page_is_filtered_out() {
    let sink = MemorySink::new();
    let supervisor = Supervisor::new(
        config(2, 4),
        StreamExtractor::new(NamespaceFilter::only([0])),
        Arc::new(Identity),
        Box::new(sink.clone()),
    );
    let cancel = supervisor.cancel_handle();

    let (tx, rx) = mpsc::channel();
    let runner = thread::spawn(move || {
        let report = supervisor.run(BufReader::new(EndlessDump::with_namespace(1)));
        let _ = tx.send(report);
    });

    thread::sleep(Duration::from_millis(200));
    assert!(cancel.cancel());

    let report = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("run did not stop within 5s of cancel");
    runner.join().unwrap();

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    assert_eq!(report.stats.extracted, 0);
    assert!(sink.is_empty());
    assert_eq!(sink.close_calls(), 1);
}

#[test]
fn test_default_cleaner_survives_adversarial_markup() {
    let nasty = [
        "[[".repeat(200_000),
        format!("{}core{}", "[[a|".repeat(50_000), "]]".repeat(50_000)),
        "{{".repeat(100_000),
        "{|".repeat(100_000),
        "<ref>".repeat(50_000),
    ];
    let pages: Vec<String> = nasty
        .iter()
        .enumerate()
        .map(|(i, body)| page(&format!("Nasty {}", i), 0, &body.replace('<', "&lt;")))
        .chain(std::iter::once(page("Plain", 0, "plain [[text]]")))
        .collect();

    let (report, sink) = run_memory(
        &dump(&pages),
        config(2, 4),
        NamespaceFilter::default(),
        Arc::new(WikiTextCleaner::new()),
    );

    assert!(report.is_success(), "{:?}", report.outcome);
    assert_eq!(report.stats.transformed, 6);
    assert_eq!(sink.get("Plain").as_deref(), Some("plain text"));
    assert_eq!(sink.get("Nasty 1").as_deref(), Some("core"));
}

#[test]
fn test_cancelled_run_stores_only_transformed_pages() {
    let completed = Arc::new(Mutex::new(HashSet::new()));
    let sink = MemorySink::new();

    let seen = Arc::clone(&completed);
    let tracking = from_fn(move |body: &str| {
        thread::sleep(Duration::from_micros(200));
        seen.lock().insert(body.to_string());
        Ok(body.to_string())
    });
    let supervisor = Supervisor::new(
        config(3, 8),
        StreamExtractor::new(NamespaceFilter::default()),
        Arc::new(tracking),
        Box::new(sink.clone()),
    );

    let cancel = supervisor.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        cancel.cancel();
    });

    let report = supervisor.run(BufReader::new(EndlessDump::new()));
    canceller.join().unwrap();

    assert!(matches!(report.outcome, RunOutcome::Cancelled));
    let completed = completed.lock();
    for (title, body) in sink.rows() {
        assert!(completed.contains(&body), "{} stored without a completed transform", title);
    }
}

#[test]
fn test_bzip2_dump_into_sled() {
    let temp_dir = TempDir::new().unwrap();
    let dump_path = temp_dir.path().join("sample-pages-articles.xml.bz2");
    let db_path = temp_dir.path().join("pages.sled");

    let xml = dump(&[
        page("Albert Einstein", 0, "'''Albert Einstein''' was a [[physicist|theoretical physicist]].{{Infobox}}"),
        page("Talk:Albert Einstein", 1, "Discussion"),
        page("Physics", 0, "Physics is a [[science]].[[Category:Science]]"),
    ]);
    let mut encoder = BzEncoder::new(std::fs::File::create(&dump_path).unwrap(), Compression::best());
    encoder.write_all(xml.as_bytes()).unwrap();
    encoder.finish().unwrap();

    {
        let sink = SledSink::open(&db_path, "pages").unwrap().with_sync_writes(true);
        let supervisor = Supervisor::new(
            config(2, 4),
            StreamExtractor::new(NamespaceFilter::default()),
            Arc::new(WikiTextCleaner::new()),
            Box::new(sink),
        );
        let report = supervisor.run(open_dump(&dump_path).unwrap());
        assert!(report.is_success(), "{:?}", report.outcome);
        assert_eq!(report.stats.written, 2);
    }

    let sink = SledSink::open(&db_path, "pages").unwrap();
    assert_eq!(sink.len(), 2);
    assert_eq!(
        sink.get("Albert Einstein").unwrap().as_deref(),
        Some("Albert Einstein was a theoretical physicist.")
    );
    assert_eq!(sink.get("Physics").unwrap().as_deref(), Some("Physics is a science."));
}

#[test]
fn test_rerun_into_existing_sled_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("pages.sled");
    let xml = dump(&[page("One", 0, "first"), page("Two", 0, "second")]);

    for expected_written in [2, 0] {
        let sink = SledSink::open(&db_path, "pages").unwrap();
        let supervisor = Supervisor::new(
            config(2, 4),
            StreamExtractor::new(NamespaceFilter::default()),
            Arc::new(Identity),
            Box::new(sink),
        );
        let report = supervisor.run(Cursor::new(xml.clone()));
        assert!(report.is_success());
        assert_eq!(report.stats.written, expected_written);
    }

    let mut sink = SledSink::open(&db_path, "pages").unwrap();
    assert_eq!(sink.len(), 2);
    sink.close().unwrap();
}
