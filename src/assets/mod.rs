//! Texture registry: file paths and aliases in, GPU textures out.
//!
//! `register` queues a record for the decode thread, which turns the file
//! into RGBA8 pixels and parks them on the upload queue. The render thread
//! calls `pump_uploads` once per frame to hand those pixels to the graphics
//! backend, after which the record resolves as ready. Alias changes are
//! broadcast on an invalidation channel that [`TextureHandle`]s listen to.

mod decode;
mod events;
mod handle;
mod record;
mod registry;
mod upload;
mod worker;

pub use decode::{DecodeError, DecodedImage, FileDecoder, ImageDecoder};
pub use events::{AliasEvent, InvalidationChannel, Subscription};
pub use handle::TextureHandle;
pub use record::{TextureRecord, TextureState};
pub use registry::{RegistryOptions, TextureRegistry};
pub use upload::UploadReport;

use log::info;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

// --- Canonical Paths ---

/// Normalizes `p` into the registry's identity key: absolute, `/`-separated,
/// with `.` and `..` folded away. Relative paths are taken against `root`
/// (itself resolved against the working directory). Purely lexical; the file
/// does not need to exist.
pub fn canonical_texture_path<P: AsRef<Path>>(p: P, root: Option<&Path>) -> String {
    let unified = p.as_ref().to_string_lossy().replace('\\', "/");
    let p = Path::new(&unified);
    let absolute: PathBuf = if p.has_root() {
        p.to_path_buf()
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        match root {
            Some(root) => cwd.join(root).join(p),
            None => cwd.join(p),
        }
    };

    let mut prefix = String::new();
    let mut parts: Vec<String> = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(pre) => prefix = pre.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    let mut out = prefix.replace('\\', "/");
    out.push('/');
    out.push_str(&parts.join("/"));
    out
}

// --- Process-wide Instance ---

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("texture registry already created")]
    DuplicateInstantiation,
    #[error("texture registry accessed before create() or after destroy()")]
    UninitializedAccess,
    #[error("failed to start decode worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

static REGISTRY: Mutex<Option<Arc<TextureRegistry>>> = Mutex::new(None);

/// Creates the process-wide registry. Calling it again before [`destroy`] is
/// an error.
pub fn create(
    decoder: Box<dyn ImageDecoder>,
    options: RegistryOptions,
) -> Result<Arc<TextureRegistry>, LifecycleError> {
    let mut slot = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(LifecycleError::DuplicateInstantiation);
    }
    let registry = Arc::new(TextureRegistry::new(decoder, options)?);
    *slot = Some(Arc::clone(&registry));
    info!("Texture registry created.");
    Ok(registry)
}

/// The registry made by [`create`]. Hand the returned `Arc` to collaborators
/// rather than calling this from everywhere.
pub fn get() -> Result<Arc<TextureRegistry>, LifecycleError> {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(LifecycleError::UninitializedAccess)
}

/// Stops the process-wide registry and returns its records. Outstanding
/// `Arc<TextureRegistry>` clones stay valid but resolve everything as empty.
pub fn destroy() -> Result<Vec<Arc<TextureRecord>>, LifecycleError> {
    let registry = REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .ok_or(LifecycleError::UninitializedAccess)?;
    let records = registry.stop_and_wait();
    info!("Texture registry destroyed.");
    Ok(records)
}
