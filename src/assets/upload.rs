use crate::assets::decode::DecodedImage;
use crate::assets::record::TextureRecord;
use crate::assets::registry::{Shared, lock};
use crate::core::gfx::{SamplerDesc, TextureUploader};
use log::{debug, warn};
use std::sync::Arc;

/// A decoded record together with its pixels. Whoever holds this value owns
/// the buffer: the decode thread creates it, the upload queue stores it, and
/// the upload step consumes it.
pub(crate) struct DecodedTexture {
    pub(crate) record: Arc<TextureRecord>,
    pub(crate) image: DecodedImage,
}

/// Outcome of one [`pump_uploads`](crate::assets::TextureRegistry::pump_uploads) call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Entries left queued because of the per-call budget.
    pub deferred: usize,
}

/// Drains the queue depth observed at entry (or `budget` entries when
/// non-zero) and hands each image to the backend.
pub(crate) fn pump(shared: &Shared, uploader: &mut dyn TextureUploader, budget: usize) -> UploadReport {
    let (batch, deferred) = {
        let mut queue = lock(&shared.upload_queue);
        let take = if budget == 0 {
            queue.len()
        } else {
            budget.min(queue.len())
        };
        let batch: Vec<DecodedTexture> = queue.drain(..take).collect();
        (batch, queue.len())
    };

    let mut report = UploadReport {
        deferred,
        ..UploadReport::default()
    };
    for DecodedTexture { record, image } in batch {
        let DecodedImage {
            pixels,
            width,
            height,
        } = image;
        let result = uploader.upload(&pixels, width, height, SamplerDesc::texture());
        // The CPU copy is released before the record becomes visible as ready.
        drop(pixels);
        match result {
            Ok(handle) if record.finish_upload(handle) => {
                debug!(
                    "Uploaded texture '{}' ({width}x{height}) as {handle}.",
                    record.canonical_path()
                );
                report.uploaded += 1;
            }
            Ok(handle) => {
                warn!(
                    "Texture '{}' was not awaiting upload; discarding {handle}.",
                    record.canonical_path()
                );
                record.mark_failed();
                report.failed += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to create GPU texture for '{}': {e}",
                    record.canonical_path()
                );
                record.mark_failed();
                report.failed += 1;
            }
        }
    }
    report
}
