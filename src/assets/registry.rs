use crate::assets::canonical_texture_path;
use crate::assets::decode::ImageDecoder;
use crate::assets::events::{AliasEvent, InvalidationChannel, Subscription};
use crate::assets::record::{TextureRecord, TextureState};
use crate::assets::upload::{self, DecodedTexture, UploadReport};
use crate::assets::worker;
use crate::config::Config;
use crate::core::gfx::TextureUploader;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[inline(always)]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Longest the decode thread sleeps on an empty queue before re-checking
    /// the stop flag.
    pub idle_wait: Duration,
    /// Poll interval used by `stop_and_wait`.
    pub stop_poll_interval: Duration,
    /// Max uploads per `pump_uploads`; 0 drains the whole queue.
    pub upload_budget: usize,
    /// Base for relative paths; the working directory when `None`.
    pub asset_root: Option<PathBuf>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(16),
            stop_poll_interval: Duration::from_millis(5),
            upload_budget: 0,
            asset_root: None,
        }
    }
}

impl RegistryOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            idle_wait: Duration::from_millis(u64::from(cfg.decode_idle_wait_ms)),
            stop_poll_interval: Duration::from_millis(u64::from(cfg.stop_poll_interval_ms)),
            upload_budget: cfg.upload_budget as usize,
            asset_root: cfg.asset_root.clone(),
        }
    }
}

/// State shared with the decode thread.
pub(crate) struct Shared {
    pub(crate) decode_queue: Mutex<VecDeque<Arc<TextureRecord>>>,
    pub(crate) decode_signal: Condvar,
    pub(crate) upload_queue: Mutex<VecDeque<DecodedTexture>>,
    pub(crate) stop: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) idle_wait: Duration,
}

/// Owns every texture record, keyed by canonical path, plus the alias table.
///
/// The path table, alias table, decode queue and upload queue each sit behind
/// their own lock, and no method holds two of them at once. Alias events are
/// published while the alias lock is held; the channel has its own lock.
pub struct TextureRegistry {
    shared: Arc<Shared>,
    paths: Mutex<HashMap<String, Arc<TextureRecord>>>,
    aliases: RwLock<HashMap<String, String>>,
    events: InvalidationChannel,
    options: RegistryOptions,
    pumping: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the re-entrancy flag of `pump_uploads`.
struct PumpGuard<'a>(&'a AtomicBool);

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TextureRegistry {
    /// Starts the decode thread. It lives until `stop_and_wait` or drop.
    pub fn new(decoder: Box<dyn ImageDecoder>, options: RegistryOptions) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            decode_queue: Mutex::new(VecDeque::new()),
            decode_signal: Condvar::new(),
            upload_queue: Mutex::new(VecDeque::new()),
            stop: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            idle_wait: options.idle_wait.max(Duration::from_millis(1)),
        });
        let handle = worker::spawn(Arc::clone(&shared), decoder)?;
        Ok(Self {
            shared,
            paths: Mutex::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            events: InvalidationChannel::new(),
            options,
            pumping: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub const fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn canonicalize<P: AsRef<Path>>(&self, path: P) -> String {
        canonical_texture_path(path, self.options.asset_root.as_deref())
    }

    // --- Registration ---

    /// Makes `path` known to the registry, queueing a decode the first time
    /// its canonical form is seen. A non-empty `alias` is pointed at it and an
    /// `Added` or `Edited` event is published, even if the alias already
    /// pointed at the same path. After shutdown the path itself is ignored.
    /// Returns the canonical path.
    pub fn register<P: AsRef<Path>>(&self, path: P, alias: Option<&str>) -> String {
        let canonical = self.canonicalize(path);

        if self.shared.stop.load(Ordering::Acquire) {
            // Nothing drains the decode queue any more; keep the tables as
            // `stop_and_wait` left them.
            warn!("Registered '{canonical}' after shutdown; ignoring the path.");
        } else {
            let created = {
                let mut paths = lock(&self.paths);
                if paths.contains_key(&canonical) {
                    None
                } else {
                    let record = Arc::new(TextureRecord::pending(canonical.clone()));
                    paths.insert(canonical.clone(), Arc::clone(&record));
                    Some(record)
                }
            };
            if let Some(record) = created {
                debug!("Queued '{canonical}' for decode.");
                lock(&self.shared.decode_queue).push_back(Arc::clone(&record));
                self.shared.decode_signal.notify_one();
                // Lost a race with shutdown: the worker may already be gone.
                if self.shared.stop.load(Ordering::Acquire) {
                    record.mark_failed();
                }
            }
        }

        if let Some(alias) = alias.filter(|a| !a.is_empty()) {
            let mut aliases = self.aliases.write().unwrap_or_else(PoisonError::into_inner);
            let event = match aliases.insert(alias.to_string(), canonical.clone()) {
                None => AliasEvent::Added(alias.to_string()),
                Some(_) => AliasEvent::Edited(alias.to_string()),
            };
            trace!("Alias '{alias}' -> '{canonical}' ({event:?}).");
            // Published under the alias lock so events for one alias arrive in
            // mutation order.
            self.events.publish(event);
        }
        canonical
    }

    /// Drops `alias`, publishing `Removed` if it existed. The record it
    /// pointed at stays registered.
    pub fn remove_alias(&self, alias: &str) -> bool {
        let mut aliases = self.aliases.write().unwrap_or_else(PoisonError::into_inner);
        let removed = aliases.remove(alias).is_some();
        if removed {
            trace!("Alias '{alias}' removed.");
            self.events.publish(AliasEvent::Removed(alias.to_string()));
        }
        removed
    }

    // --- Queries ---

    /// The placeholder handed out for anything missing or not ready.
    pub fn empty(&self) -> Arc<TextureRecord> {
        TextureRecord::sentinel()
    }

    fn resolve_canonical(&self, canonical: &str) -> Arc<TextureRecord> {
        let record = lock(&self.paths).get(canonical).cloned();
        match record {
            Some(record) if record.is_ready() => record,
            _ => self.empty(),
        }
    }

    /// The ready record behind `alias`, or the empty record. Never blocks on
    /// loading.
    pub fn resolve_by_alias(&self, alias: &str) -> Arc<TextureRecord> {
        match self.path_of(alias) {
            Some(canonical) => self.resolve_canonical(&canonical),
            None => self.empty(),
        }
    }

    pub fn resolve_by_path<P: AsRef<Path>>(&self, path: P) -> Arc<TextureRecord> {
        self.resolve_canonical(&self.canonicalize(path))
    }

    /// The canonical path `alias` maps to, whether or not it has loaded.
    pub fn path_of(&self, alias: &str) -> Option<String> {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .cloned()
    }

    pub fn all_alias_names(&self) -> Vec<String> {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn state_of_path<P: AsRef<Path>>(&self, path: P) -> Option<TextureState> {
        let canonical = self.canonicalize(path);
        lock(&self.paths).get(&canonical).map(|r| r.state())
    }

    pub fn record_count(&self) -> usize {
        lock(&self.paths).len()
    }

    pub fn pending_decodes(&self) -> usize {
        lock(&self.shared.decode_queue).len()
    }

    pub fn pending_uploads(&self) -> usize {
        lock(&self.shared.upload_queue).len()
    }

    /// True when every record is either `Ready` or `Failed`.
    pub fn is_settled(&self) -> bool {
        lock(&self.paths).values().all(|r| r.state().is_settled())
    }

    // --- Invalidation ---

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn subscribe_alias(&self, alias: &str) -> Subscription {
        self.events.subscribe_alias(alias)
    }

    // --- Upload Step ---

    /// Uploads decoded images. Call once per frame from the thread owning the
    /// graphics context. Never waits on the decode thread; a call made while
    /// another is still running returns an empty report.
    pub fn pump_uploads(&self, uploader: &mut dyn TextureUploader) -> UploadReport {
        if self.pumping.swap(true, Ordering::AcqRel) {
            warn!("pump_uploads called concurrently; skipping.");
            return UploadReport::default();
        }
        let _guard = PumpGuard(&self.pumping);
        upload::pump(&self.shared, uploader, self.options.upload_budget)
    }

    // --- Shutdown ---

    /// Raises the stop flag and blocks until the decode thread has exited.
    /// Every caller waits; only the one that takes the join handle joins.
    fn shutdown_worker(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.decode_signal.notify_all();
        let handle = lock(&self.worker).take();
        let poll = self.options.stop_poll_interval.max(Duration::from_millis(1));
        while !self.shared.stopped.load(Ordering::Acquire) {
            thread::sleep(poll);
        }
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Decode worker exited with a panic.");
        }
    }

    /// Stops the decode thread, waits for it, and hands every record over to
    /// the caller. Decoded images still waiting for upload are released.
    pub fn stop_and_wait(&self) -> Vec<Arc<TextureRecord>> {
        self.shutdown_worker();
        lock(&self.shared.decode_queue).clear();
        let dropped = {
            let mut queue = lock(&self.shared.upload_queue);
            let n = queue.len();
            queue.clear();
            n
        };
        let records: Vec<Arc<TextureRecord>> = lock(&self.paths).drain().map(|(_, r)| r).collect();
        info!(
            "Texture registry stopped: {} record(s) released, {dropped} pending upload(s) dropped.",
            records.len()
        );
        records
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl Drop for TextureRegistry {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistryOptions, TextureRegistry};
    use crate::assets::decode::tests::write_png;
    use crate::assets::decode::{DecodeError, DecodedImage, FileDecoder, ImageDecoder};
    use crate::assets::events::AliasEvent;
    use crate::assets::record::TextureState;
    use crate::core::gfx::{Backend, GpuHandle, SamplerDesc, TextureUploader, UploadError};
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::time::{Duration, Instant};

    /// Sizes images by file name: "WxH.png" decodes to WxH, anything
    /// containing "bad" fails.
    struct FakeDecoder {
        calls: Arc<AtomicUsize>,
    }

    impl FakeDecoder {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl ImageDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if name.contains("bad") {
                return Err(DecodeError::ZeroDimensions {
                    width: 0,
                    height: 0,
                });
            }
            let (w, h): (u32, u32) = name
                .split_once('x')
                .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
                .unwrap_or((2, 2));
            Ok(DecodedImage {
                pixels: vec![0xAB; w as usize * h as usize * 4],
                width: w,
                height: h,
            })
        }
    }

    /// Records every upload; refuses everything when `refuse` is set.
    #[derive(Default)]
    struct RecordingUploader {
        next: u64,
        refuse: bool,
        seen: Vec<(u32, u32, SamplerDesc)>,
    }

    impl TextureUploader for RecordingUploader {
        fn upload(
            &mut self,
            pixels: &[u8],
            width: u32,
            height: u32,
            sampler: SamplerDesc,
        ) -> Result<GpuHandle, UploadError> {
            assert_eq!(pixels.len(), width as usize * height as usize * 4);
            if self.refuse {
                return Err(UploadError::OutOfTextures { limit: 0 });
            }
            self.seen.push((width, height, sampler));
            self.next += 1;
            Ok(GpuHandle::new(self.next).unwrap())
        }
    }

    fn options() -> RegistryOptions {
        RegistryOptions {
            idle_wait: Duration::from_millis(2),
            stop_poll_interval: Duration::from_millis(1),
            ..RegistryOptions::default()
        }
    }

    fn fake_registry() -> (TextureRegistry, Arc<AtomicUsize>) {
        let (decoder, calls) = FakeDecoder::new();
        (
            TextureRegistry::new(Box::new(decoder), options()).expect("spawn decode worker"),
            calls,
        )
    }

    /// Pumps until the registry settles or the deadline passes.
    fn pump_until_settled(reg: &TextureRegistry, up: &mut dyn TextureUploader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            reg.pump_uploads(up);
            if reg.is_settled() && reg.pending_uploads() == 0 {
                return;
            }
            assert!(Instant::now() < deadline, "registry did not settle in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn wait_for_state(reg: &TextureRegistry, path: &str, want: TextureState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while reg.state_of_path(path) != Some(want) {
            assert!(Instant::now() < deadline, "'{path}' never reached {want:?}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn same_canonical_path_yields_one_record() {
        let (reg, calls) = fake_registry();
        let a = reg.register("/img/./a.png", None);
        let b = reg.register("/img/sub/../a.png", None);
        let c = reg.register("/img//a.png", Some("hero"));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(reg.record_count(), 1);
        pump_until_settled(&reg, &mut RecordingUploader::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn alias_resolves_to_empty_until_uploaded() {
        let (reg, _) = fake_registry();
        let mut up = RecordingUploader::default();
        reg.register("/img/8x4.png", Some("hero"));
        let before = reg.resolve_by_alias("hero");
        assert!(before.is_empty());
        assert_eq!(before.width(), 0);

        wait_for_state(&reg, "/img/8x4.png", TextureState::Decoded);
        assert!(reg.resolve_by_alias("hero").is_empty(), "decoded is not ready");
        assert_eq!(reg.pending_uploads(), 1);

        let report = reg.pump_uploads(&mut up);
        assert_eq!(report.uploaded, 1);
        let hero = reg.resolve_by_alias("hero");
        assert!(hero.is_ready());
        assert!(!hero.is_empty());
        assert_eq!(hero.dims(), (8, 4));
        assert!(hero.gpu_handle().is_some());
        assert_eq!(up.seen, vec![(8, 4, SamplerDesc::texture())]);
        assert_eq!(reg.pending_uploads(), 0);
    }

    #[test]
    fn path_of_exposes_unloaded_targets() {
        let (reg, _) = fake_registry();
        assert_eq!(reg.path_of("hero"), None);
        let canonical = reg.register("/img/a.png", Some("hero"));
        assert_eq!(reg.path_of("hero").as_deref(), Some(canonical.as_str()));
        assert!(reg.resolve_by_alias("hero").is_empty());
        assert!(reg.resolve_by_alias("nobody").is_empty());
    }

    #[test]
    fn alias_events_distinguish_add_and_edit() {
        let (reg, _) = fake_registry();
        let sub = reg.subscribe();
        reg.register("/img/a.png", Some("hero"));
        reg.register("/img/a.png", Some("hero"));
        reg.register("/img/b.png", Some("hero"));
        reg.register("/img/c.png", None);
        reg.register("/img/c.png", Some(""));
        assert_eq!(
            sub.poll(),
            vec![
                AliasEvent::Added("hero".into()),
                AliasEvent::Edited("hero".into()),
                AliasEvent::Edited("hero".into()),
            ]
        );
        assert!(reg.remove_alias("hero"));
        assert!(!reg.remove_alias("hero"));
        assert_eq!(sub.poll(), vec![AliasEvent::Removed("hero".into())]);
        assert_eq!(reg.record_count(), 3);
    }

    #[test]
    fn replaced_alias_never_resolves_to_old_target() {
        let (reg, _) = fake_registry();
        let sub = reg.subscribe_alias("hero");
        reg.register("/img/4x4.png", Some("hero"));
        reg.register("/img/16x16.png", Some("hero"));
        assert_eq!(
            sub.poll(),
            vec![
                AliasEvent::Added("hero".into()),
                AliasEvent::Edited("hero".into())
            ]
        );
        pump_until_settled(&reg, &mut RecordingUploader::default());
        let hero = reg.resolve_by_alias("hero");
        assert_eq!(hero.canonical_path(), reg.canonicalize("/img/16x16.png"));
        assert_eq!(hero.dims(), (16, 16));
        assert!(reg.resolve_by_path("/img/4x4.png").is_ready());
    }

    #[test]
    fn decode_failure_is_terminal() {
        let (reg, calls) = fake_registry();
        reg.register("/img/bad.png", Some("broken"));
        wait_for_state(&reg, "/img/bad.png", TextureState::Failed);
        let mut up = RecordingUploader::default();
        for _ in 0..10 {
            assert_eq!(reg.pump_uploads(&mut up).uploaded, 0);
        }
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "failed decodes are not retried");
        assert!(reg.resolve_by_path("/img/bad.png").is_empty());
        assert!(reg.resolve_by_alias("broken").is_empty());
        reg.register("/img/bad.png", None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(up.seen.is_empty());
    }

    #[test]
    fn upload_failure_is_terminal() {
        let (reg, _) = fake_registry();
        reg.register("/img/3x3.png", Some("hero"));
        wait_for_state(&reg, "/img/3x3.png", TextureState::Decoded);
        let mut refusing = RecordingUploader {
            refuse: true,
            ..RecordingUploader::default()
        };
        let report = reg.pump_uploads(&mut refusing);
        assert_eq!(report.failed, 1);
        assert_eq!(reg.state_of_path("/img/3x3.png"), Some(TextureState::Failed));

        let mut working = RecordingUploader::default();
        assert_eq!(reg.pump_uploads(&mut working), Default::default());
        assert!(working.seen.is_empty());
        assert!(reg.resolve_by_alias("hero").is_empty());
    }

    #[test]
    fn software_backend_limit_fails_closed() {
        let (reg, _) = fake_registry();
        let mut backend = Backend::software(Some(1));
        reg.register("/img/1x1.png", None);
        reg.register("/img/2x2.png", None);
        pump_until_settled(&reg, &mut backend);
        let states = [
            reg.state_of_path("/img/1x1.png"),
            reg.state_of_path("/img/2x2.png"),
        ];
        assert_eq!(states.iter().filter(|s| **s == Some(TextureState::Ready)).count(), 1);
        assert_eq!(states.iter().filter(|s| **s == Some(TextureState::Failed)).count(), 1);
        assert_eq!(backend.texture_count(), 1);
    }

    #[test]
    fn upload_budget_defers_the_rest() {
        let (decoder, _) = FakeDecoder::new();
        let reg = TextureRegistry::new(
            Box::new(decoder),
            RegistryOptions {
                upload_budget: 1,
                ..options()
            },
        )
        .unwrap();
        for i in 1..=3 {
            reg.register(format!("/img/{i}x{i}.png"), None);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while reg.pending_uploads() < 3 {
            assert!(Instant::now() < deadline, "decodes did not finish");
            std::thread::sleep(Duration::from_millis(1));
        }
        let mut up = RecordingUploader::default();
        let first = reg.pump_uploads(&mut up);
        assert_eq!((first.uploaded, first.deferred), (1, 2));
        let second = reg.pump_uploads(&mut up);
        assert_eq!((second.uploaded, second.deferred), (1, 1));
        let third = reg.pump_uploads(&mut up);
        assert_eq!((third.uploaded, third.deferred), (1, 0));
        assert!(reg.is_settled());
    }

    #[test]
    fn concurrent_registration_loses_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;
        let (reg, calls) = fake_registry();
        let reg = Arc::new(reg);
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let reg = Arc::clone(&reg);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        reg.register(format!("/img/t{t}/{i}.png"), Some(format!("t{t}-{i}").as_str()));
                        // Everyone also races on one shared path.
                        reg.register("/img/shared.png", None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.record_count(), THREADS * PER_THREAD + 1);
        let names: HashSet<String> = reg.all_alias_names().into_iter().collect();
        assert_eq!(names.len(), THREADS * PER_THREAD);
        assert!(names.contains("t3-7"));
        pump_until_settled(&reg, &mut RecordingUploader::default());
        assert_eq!(calls.load(Ordering::SeqCst), THREADS * PER_THREAD + 1);
    }

    #[test]
    fn pump_runs_on_another_thread_than_decode() {
        let (reg, _) = fake_registry();
        let reg = Arc::new(reg);
        let uploads = Arc::new(Mutex::new(RecordingUploader::default()));
        reg.register("/img/5x5.png", Some("hero"));
        let render = {
            let reg = Arc::clone(&reg);
            let uploads = Arc::clone(&uploads);
            std::thread::spawn(move || {
                let mut up = uploads.lock().unwrap();
                pump_until_settled(&reg, &mut *up);
            })
        };
        render.join().unwrap();
        assert_eq!(reg.resolve_by_alias("hero").dims(), (5, 5));
    }

    #[test]
    fn stop_and_wait_hands_back_records() {
        let (reg, _) = fake_registry();
        reg.register("/img/a.png", Some("a"));
        reg.register("/img/b.png", Some("b"));
        pump_until_settled(&reg, &mut RecordingUploader::default());
        let records = reg.stop_and_wait();
        assert!(reg.is_stopped());
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_ready()));
        assert_eq!(reg.record_count(), 0);
        assert!(reg.resolve_by_alias("a").is_empty());
        assert!(reg.stop_and_wait().is_empty());
    }

    #[test]
    fn idle_worker_stops_promptly() {
        let (reg, _) = fake_registry();
        std::thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        reg.stop_and_wait();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn decodes_real_files_end_to_end() {
        let png = write_png("registry.png", 6, 3);
        let reg = TextureRegistry::new(Box::new(FileDecoder::new()), options()).unwrap();
        let mut backend = Backend::software(None);
        reg.register(&png, Some("real"));
        reg.register(png.with_extension("missing.png"), Some("missing"));
        pump_until_settled(&reg, &mut backend);
        let real = reg.resolve_by_alias("real");
        assert_eq!(real.dims(), (6, 3));
        let handle = real.gpu_handle().expect("handle");
        assert_eq!(backend.texture_dims(handle), Some((6, 3)));
        assert!(reg.resolve_by_alias("missing").is_empty());
        let _ = std::fs::remove_file(png);
    }

    #[test]
    fn alias_events_follow_mutation_order_under_contention() {
        const ROUNDS: usize = 500;
        let (reg, _) = fake_registry();
        let reg = Arc::new(reg);
        let sub = reg.subscribe();
        let barrier = Arc::new(Barrier::new(3));
        let workers: Vec<_> = (0..3)
            .map(|t| {
                let reg = Arc::clone(&reg);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    for round in 0..ROUNDS {
                        let alias = format!("race-{round}");
                        barrier.wait();
                        if t == 2 {
                            reg.remove_alias(&alias);
                        } else {
                            reg.register(format!("/img/{t}.png"), Some(alias.as_str()));
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        // Replaying the stream must never contradict the alias table.
        let mut live: HashMap<String, bool> = HashMap::new();
        for event in sub.poll() {
            let exists = live.entry(event.alias().to_string()).or_default();
            match &event {
                AliasEvent::Added(_) => {
                    assert!(!*exists, "{event:?} for an alias that already exists");
                    *exists = true;
                }
                AliasEvent::Edited(_) => assert!(*exists, "{event:?} before Added"),
                AliasEvent::Removed(_) => {
                    assert!(*exists, "{event:?} for a missing alias");
                    *exists = false;
                }
            }
        }
        assert_eq!(live.len(), ROUNDS);
        for (alias, exists) in &live {
            assert_eq!(reg.path_of(alias).is_some(), *exists, "'{alias}' out of sync");
        }
    }

    #[test]
    fn registration_after_stop_settles_immediately() {
        let (reg, calls) = fake_registry();
        reg.stop_and_wait();
        let canonical = reg.register("/img/late.png", Some("late"));
        assert_eq!(reg.pending_decodes(), 0);
        assert!(reg.is_settled());
        assert_eq!(reg.record_count(), 0);
        assert_eq!(reg.state_of_path(&canonical), None);
        assert!(reg.resolve_by_alias("late").is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_concurrent_stop_waits_for_the_worker() {
        const CALLERS: usize = 4;
        const TEXTURES: usize = 8;
        for _ in 0..20 {
            let (reg, _) = fake_registry();
            let reg = Arc::new(reg);
            for i in 1..=TEXTURES {
                reg.register(format!("/img/{i}x{i}.png"), None);
            }
            let barrier = Arc::new(Barrier::new(CALLERS));
            let callers: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        let records = reg.stop_and_wait();
                        assert!(reg.is_stopped(), "returned before the decode thread exited");
                        records.len()
                    })
                })
                .collect();
            let released: usize = callers.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(released, TEXTURES, "each record is handed back exactly once");
        }
    }
}
