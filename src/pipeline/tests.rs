use super::workers::run_worker;
use super::*;
use crate::error::FetchError;
use crate::observer::BroadcastObserver;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory source keyed by URL. Unknown URLs answer 404.
#[derive(Default)]
struct MapSource {
    bodies: HashMap<String, std::result::Result<Vec<u8>, FetchError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MapSource {
    fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), Ok(body.to_vec()));
        self
    }

    fn with_status(mut self, url: &str, status: u16) -> Self {
        self.bodies.insert(
            url.to_string(),
            Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
        );
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Source for MapSource {
    async fn download(&self, url: &str, buffer: &mut Vec<u8>) -> std::result::Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.bodies.get(url) {
            Some(Ok(body)) => {
                buffer.extend_from_slice(body);
                Ok(())
            }
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Records every event it sees.
#[derive(Default)]
struct RecordingObserver {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Counts successful fetches as they happen.
#[derive(Default)]
struct FetchCounter {
    fetched: AtomicUsize,
}

impl Observer for FetchCounter {
    fn on_event(&self, event: &Event) {
        if matches!(event, Event::FetchSucceeded { .. }) {
            self.fetched.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Sink that tracks how many writes are in progress at once.
struct ConcurrencyProbeSink {
    inner: Cursor<Vec<u8>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Write for ConcurrencyProbeSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_micros(200));
        let written = self.inner.write(buf);
        self.active.fetch_sub(1, Ordering::SeqCst);
        written
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for ConcurrencyProbeSink {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Sink whose writes block until the gate opens.
struct GatedSink {
    inner: Cursor<Vec<u8>>,
    open: Arc<AtomicBool>,
}

impl Write for GatedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for GatedSink {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Sink that rejects every write.
struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("no space left on device"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for BrokenSink {
    fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
        Ok(0)
    }
}

fn config(worker_count: usize) -> PipelineConfig {
    PipelineConfig {
        worker_count,
        ..PipelineConfig::default()
    }
}

fn url(n: usize) -> String {
    format!("http://tracks.test/{n}.mp3")
}

fn read_entries<R: Read + Seek>(sink: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(sink).unwrap();
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        assert_eq!(file.compression(), zip::CompressionMethod::Stored);
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        entries.insert(file.name().to_string(), content);
    }
    entries
}

fn new_job(
    items: Vec<ItemDescriptor>,
    source: MapSource,
    worker_count: usize,
) -> PipelineJob<Cursor<Vec<u8>>> {
    PipelineJob::new(items, Cursor::new(Vec::new()), Arc::new(source), &config(worker_count))
}

#[tokio::test]
async fn empty_album_produces_empty_archive() {
    let mut job = new_job(Vec::new(), MapSource::default(), 4);
    assert_eq!(job.state(), JobState::Created);

    let report = job.run().await.unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.failure_count(), 0);
    let entries = read_entries(job.into_sink().unwrap());
    assert!(entries.is_empty());
}

#[tokio::test]
async fn archives_every_successful_item() {
    let mut source = MapSource::default();
    let mut items = Vec::new();
    let mut expected = BTreeMap::new();
    for n in 0..12 {
        let body = format!("track body {n}").into_bytes();
        source = source.with_body(&url(n), &body);
        items.push(ItemDescriptor::new("Artist", format!("Track {n}"), url(n)));
        expected.insert(format!("Artist - Track {n}.mp3"), body);
    }

    let mut job = new_job(items, source, 4);
    let report = job.run().await.unwrap();

    assert!(report.is_completed());
    assert_eq!(report.succeeded(), 12);
    assert!(report.failed.is_empty());
    assert_eq!(read_entries(job.into_sink().unwrap()), expected);
}

#[tokio::test]
async fn failed_item_is_left_out_and_reported() {
    let source = MapSource::default()
        .with_body(&url(1), b"hello")
        .with_status(&url(2), 500);
    let items = vec![
        ItemDescriptor::new("A", "T1", url(1)),
        ItemDescriptor::new("B", "T2", url(2)),
    ];

    let mut job = new_job(items, source, 2);
    let report = job.run().await.unwrap();

    assert_eq!(report.state, JobState::Completed);
    assert_eq!(report.archived, ["A - T1.mp3"]);
    assert_eq!(report.failure_count(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.index, 1);
    assert_eq!(failed.entry_name, "B - T2.mp3");
    assert_eq!(
        failed.error,
        FetchError::Status {
            status: 500,
            url: url(2)
        }
    );

    let entries = read_entries(job.into_sink().unwrap());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries["A - T1.mp3"], b"hello");
}

#[tokio::test]
async fn worker_keeps_going_after_a_failed_fetch() {
    // One worker and several failures: every good item must still land
    let mut source = MapSource::default();
    let mut items = Vec::new();
    for n in 0..8 {
        if n % 3 == 0 {
            source = source.with_status(&url(n), 503);
        } else {
            source = source.with_body(&url(n), b"ok");
        }
        items.push(ItemDescriptor::new("A", format!("T{n}"), url(n)));
    }

    let mut job = new_job(items, source, 1);
    let report = job.run().await.unwrap();

    assert_eq!(report.failure_count(), 3);
    assert_eq!(report.succeeded(), 5);
    let failed: Vec<usize> = report.failed.iter().map(|f| f.index).collect();
    assert_eq!(failed, [0, 3, 6]);
}

#[tokio::test]
async fn duplicate_names_are_disambiguated() {
    let source = MapSource::default()
        .with_body(&url(1), b"first")
        .with_body(&url(2), b"second")
        .with_body(&url(3), b"third");
    let items = vec![
        ItemDescriptor::new("A", "T", url(1)),
        ItemDescriptor::new("A", "T", url(2)),
        ItemDescriptor::new("A", "T", url(3)),
    ];

    let mut job = new_job(items, source, 3);
    job.run().await.unwrap();

    let entries = read_entries(job.into_sink().unwrap());
    assert_eq!(entries["A - T.mp3"], b"first");
    assert_eq!(entries["A - T (1).mp3"], b"second");
    assert_eq!(entries["A - T (2).mp3"], b"third");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sink_writes_never_overlap() {
    let mut source = MapSource::default().with_delay(Duration::from_millis(2));
    let mut items = Vec::new();
    for n in 0..30 {
        source = source.with_body(&url(n), &vec![n as u8; 4096]);
        items.push(ItemDescriptor::new("A", format!("T{n}"), url(n)));
    }

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let sink = ConcurrencyProbeSink {
        inner: Cursor::new(Vec::new()),
        active: Arc::clone(&active),
        max_active: Arc::clone(&max_active),
    };

    let mut job = PipelineJob::new(items, sink, Arc::new(source), &config(8));
    let report = job.run().await.unwrap();

    assert_eq!(report.succeeded(), 30);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let entries = read_entries(job.into_sink().unwrap().inner);
    assert_eq!(entries.len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocked_sink_bounds_fetched_items() {
    let worker_count = 3;
    let mut source = MapSource::default();
    let mut items = Vec::new();
    for n in 0..20 {
        source = source.with_body(&url(n), b"payload");
        items.push(ItemDescriptor::new("A", format!("T{n}"), url(n)));
    }

    let open = Arc::new(AtomicBool::new(false));
    let sink = GatedSink {
        inner: Cursor::new(Vec::new()),
        open: Arc::clone(&open),
    };
    let counter = Arc::new(FetchCounter::default());
    let pipeline = PipelineConfig {
        worker_count,
        result_queue_capacity: 0,
        ..PipelineConfig::default()
    };
    let mut job = PipelineJob::new(items, sink, Arc::new(source), &pipeline)
        .with_observer(counter.clone());

    let handle = tokio::spawn(async move {
        let report = job.run().await;
        (job, report)
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let fetched_while_blocked = counter.fetched.load(Ordering::SeqCst);
    // One item inside the writer, one in the queue slot, one held by each worker
    assert!(
        fetched_while_blocked <= worker_count + 2,
        "fetched {fetched_while_blocked} items while the sink was blocked"
    );
    assert!(fetched_while_blocked >= 1);

    open.store(true, Ordering::SeqCst);
    let (job, report) = handle.await.unwrap();
    let report = report.unwrap();

    assert_eq!(report.succeeded(), 20);
    assert_eq!(counter.fetched.load(Ordering::SeqCst), 20);
    assert_eq!(read_entries(job.into_sink().unwrap().inner).len(), 20);
}

#[tokio::test]
async fn sink_failure_fails_the_job() {
    let source = MapSource::default()
        .with_body(&url(1), b"one")
        .with_body(&url(2), b"two");
    let items = vec![
        ItemDescriptor::new("A", "T1", url(1)),
        ItemDescriptor::new("A", "T2", url(2)),
    ];
    let observer = Arc::new(RecordingObserver::default());

    let mut job = PipelineJob::new(items, BrokenSink, Arc::new(source), &config(2))
        .with_observer(observer.clone());
    let err = job.run().await.unwrap_err();

    assert!(matches!(err, Error::Archive(_)), "got {err:?}");
    assert_eq!(job.state(), JobState::Failed);
    let report = job.report().unwrap();
    assert_eq!(report.state, JobState::Failed);
    assert!(report.archived.is_empty());

    let events = observer.events();
    assert!(matches!(events.last(), Some(Event::JobFailed { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::JobCompleted { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sink_failure_stops_further_downloads() {
    let worker_count = 2;
    let mut source = MapSource::default().with_delay(Duration::from_millis(5));
    let mut items = Vec::new();
    for n in 0..20 {
        source = source.with_body(&url(n), b"payload");
        items.push(ItemDescriptor::new("A", format!("T{n}"), url(n)));
    }
    let source = Arc::new(source);
    let pipeline = PipelineConfig {
        worker_count,
        result_queue_capacity: 0,
        ..PipelineConfig::default()
    };

    let mut job = PipelineJob::new(items, BrokenSink, source.clone(), &pipeline);
    let err = job.run().await.unwrap_err();

    assert!(matches!(err, Error::Archive(_)), "got {err:?}");
    // The writer took one item, one sat in the queue, each worker held one
    let downloads = source.calls.load(Ordering::SeqCst);
    assert!(
        downloads <= worker_count + 2,
        "{downloads} downloads started against a failed sink"
    );
}

#[tokio::test]
async fn waiting_worker_skips_item_once_writer_has_stopped() {
    let source = Arc::new(MapSource::default().with_body(&url(1), b"x"));
    let (item_tx, item_rx) = async_channel::bounded(1);
    let (result_tx, result_rx) = mpsc::channel(1);
    let worker = tokio::spawn(run_worker(WorkerContext {
        fetcher: ItemFetcher::new(source.clone(), BufferPool::new(1, 16)),
        items: item_rx,
        results: result_tx,
        observer: Arc::new(NoopObserver),
    }));

    // Let the worker park on the empty item queue, then stop the writer
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(result_rx);
    let descriptor = ItemDescriptor::new("A", "T1", url(1));
    let item = WorkItem {
        index: 0,
        entry_name: descriptor.entry_name(),
        descriptor,
    };
    item_tx.send(item).await.ok();
    drop(item_tx);

    let failed = worker.await.unwrap();
    assert!(failed.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn job_runs_only_once() {
    let source = MapSource::default().with_body(&url(1), b"x");
    let mut job = new_job(vec![ItemDescriptor::new("A", "T1", url(1))], source, 1);

    job.run().await.unwrap();
    let err = job.run().await.unwrap_err();

    match err {
        Error::InvalidState { operation, state } => {
            assert_eq!(operation, "run");
            assert_eq!(state, "completed");
        }
        other => panic!("expected invalid state, got {other:?}"),
    }
    assert_eq!(job.state(), JobState::Completed);
}

#[tokio::test]
async fn cancelled_job_skips_remaining_items_and_finalizes() {
    let source = MapSource::default()
        .with_body(&url(1), b"one")
        .with_body(&url(2), b"two");
    let items = vec![
        ItemDescriptor::new("A", "T1", url(1)),
        ItemDescriptor::new("A", "T2", url(2)),
    ];
    let token = CancellationToken::new();
    token.cancel();
    let observer = Arc::new(RecordingObserver::default());

    let mut job = new_job(items, source, 2)
        .with_cancellation(token)
        .with_observer(observer.clone());
    let report = job.run().await.unwrap();

    assert!(report.is_completed());
    assert_eq!(report.skipped, 2);
    assert_eq!(report.succeeded(), 0);
    assert!(read_entries(job.into_sink().unwrap()).is_empty());
    assert!(observer.events().contains(&Event::EnqueueStopped {
        enqueued: 0,
        total: 2
    }));
}

#[tokio::test]
async fn events_describe_the_run() {
    let source = MapSource::default()
        .with_body(&url(1), b"hello")
        .with_status(&url(2), 500);
    let items = vec![
        ItemDescriptor::new("A", "T1", url(1)),
        ItemDescriptor::new("B", "T2", url(2)),
    ];
    let observer = Arc::new(BroadcastObserver::new(64));
    let mut events = observer.subscribe();

    let mut job = new_job(items, source, 2).with_observer(observer.clone());
    job.run().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let started = seen
        .iter()
        .filter(|e| matches!(e, Event::FetchStarted { .. }))
        .count();
    assert_eq!(started, 2);
    assert!(seen.contains(&Event::EntryWritten {
        entry_name: "A - T1.mp3".to_string(),
        bytes: 5,
    }));
    assert!(seen.iter().any(|e| matches!(
        e,
        Event::FetchFailed { index: 1, .. }
    )));
    assert_eq!(
        seen.last(),
        Some(&Event::JobCompleted {
            archived: 1,
            failed: 1
        })
    );
}

#[tokio::test]
async fn shared_pool_is_recycled_across_jobs() {
    let pool = BufferPool::new(2, 64);
    for _ in 0..2 {
        let source = MapSource::default()
            .with_body(&url(1), b"a")
            .with_body(&url(2), b"b");
        let items = vec![
            ItemDescriptor::new("A", "T1", url(1)),
            ItemDescriptor::new("A", "T2", url(2)),
        ];
        let mut job = new_job(items, source, 2).with_buffer_pool(pool.clone());
        job.run().await.unwrap();
    }

    let metrics = pool.metrics();
    assert!(metrics.created <= 4, "created {} buffers", metrics.created);
    assert!(metrics.recycled >= 1);
    assert!(pool.idle() <= pool.capacity());
}

#[test]
fn temp_sink_opens_in_given_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = open_temp_sink(Some(dir.path())).unwrap();
    file.write_all(b"zip").unwrap();
}

#[test]
fn temp_sink_in_missing_directory_is_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let err = open_temp_sink(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Setup(_)));
}
