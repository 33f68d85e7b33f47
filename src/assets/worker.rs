use crate::assets::decode::{DecodedImage, ImageDecoder};
use crate::assets::record::TextureRecord;
use crate::assets::registry::{Shared, lock};
use crate::assets::upload::DecodedTexture;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};

const WORKER_NAME: &str = "texcache-decode";

/// Sets the `stopped` flag however the loop exits.
struct StoppedGuard<'a>(&'a Shared);

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        self.0.stopped.store(true, Ordering::Release);
    }
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    decoder: Box<dyn ImageDecoder>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_NAME.to_string())
        .spawn(move || run(&shared, decoder.as_ref()))
}

fn run(shared: &Shared, decoder: &dyn ImageDecoder) {
    let _stopped = StoppedGuard(shared);
    info!("Decode worker started.");
    let mut decoded = 0usize;
    let mut failed = 0usize;
    while !shared.stop.load(Ordering::Acquire) {
        for record in next_batch(shared) {
            if decode_one(shared, decoder, record) {
                decoded += 1;
            } else {
                failed += 1;
            }
        }
    }
    info!("Decode worker stopped ({decoded} decoded, {failed} failed).");
}

/// Takes everything queued, waiting up to the idle interval when the queue is
/// empty. The wait is cut short by `register` and by shutdown.
fn next_batch(shared: &Shared) -> Vec<Arc<TextureRecord>> {
    let mut queue = lock(&shared.decode_queue);
    if queue.is_empty() && !shared.stop.load(Ordering::Acquire) {
        queue = shared
            .decode_signal
            .wait_timeout(queue, shared.idle_wait)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|e| PoisonError::into_inner(e).0);
    }
    queue.drain(..).collect()
}

fn decode_guarded(decoder: &dyn ImageDecoder, path: &Path) -> Result<DecodedImage, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(path))) {
        Ok(Ok(image)) => image.validate().map(|()| image).map_err(|e| e.to_string()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => {
            error!("Image decoder panicked on '{}'.", path.display());
            Err("decoder panicked".to_string())
        }
    }
}

/// Returns false when the record ended up `Failed`.
fn decode_one(shared: &Shared, decoder: &dyn ImageDecoder, record: Arc<TextureRecord>) -> bool {
    if !record.begin_decode() {
        debug!(
            "Skipping '{}': already {:?}.",
            record.canonical_path(),
            record.state()
        );
        return true;
    }
    let path = Path::new(record.canonical_path());
    match decode_guarded(decoder, path) {
        Ok(image) => {
            if !record.finish_decode(image.width, image.height) {
                warn!("Texture '{}' changed state during decode.", record.canonical_path());
                record.mark_failed();
                return false;
            }
            debug!(
                "Decoded '{}' ({}x{}).",
                record.canonical_path(),
                image.width,
                image.height
            );
            lock(&shared.upload_queue).push_back(DecodedTexture { record, image });
            true
        }
        Err(msg) => {
            warn!("Failed to decode texture '{}': {msg}", record.canonical_path());
            record.mark_failed();
            false
        }
    }
}
