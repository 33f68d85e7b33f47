use crate::core::gfx::GpuHandle;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};
use std::sync::atomic::{AtomicU8, Ordering};

// --- Texture Lifecycle ---

/// `Pending -> Decoding -> Decoded -> Ready`, or the terminal `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureState {
    Pending = 0,
    Decoding = 1,
    Decoded = 2,
    Ready = 3,
    Failed = 4,
}

impl TextureState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Decoding,
            2 => Self::Decoded,
            3 => Self::Ready,
            _ => Self::Failed,
        }
    }

    /// True once the record will never change state again.
    #[inline(always)]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// One distinct image file known to the registry.
///
/// Dimensions are written once by the decode thread, the GPU handle once by
/// the upload step. Both are published before the state flips, so a reader
/// that sees `Ready` always sees valid dimensions and a handle.
pub struct TextureRecord {
    canonical_path: String,
    state: AtomicU8,
    dims: OnceLock<(u32, u32)>,
    gpu: OnceLock<GpuHandle>,
}

impl TextureRecord {
    pub(crate) fn pending(canonical_path: String) -> Self {
        Self {
            canonical_path,
            state: AtomicU8::new(TextureState::Pending as u8),
            dims: OnceLock::new(),
            gpu: OnceLock::new(),
        }
    }

    /// The "not found / not ready" placeholder: ready, zero-sized, no handle.
    fn empty() -> Self {
        Self {
            canonical_path: String::new(),
            state: AtomicU8::new(TextureState::Ready as u8),
            dims: OnceLock::new(),
            gpu: OnceLock::new(),
        }
    }

    /// The process-wide placeholder. Every registry and handle shares it, so
    /// falling back to it never keeps a real record alive.
    pub(crate) fn sentinel() -> Arc<Self> {
        Arc::clone(&EMPTY)
    }

    #[inline(always)]
    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    #[inline(always)]
    pub fn state(&self) -> TextureState {
        TextureState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn is_ready(&self) -> bool {
        self.state() == TextureState::Ready
    }

    /// True for the registry's placeholder record.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.canonical_path.is_empty()
    }

    pub fn dims(&self) -> (u32, u32) {
        self.dims.get().copied().unwrap_or((0, 0))
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.dims().0
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.dims().1
    }

    /// Present iff the record is `Ready` (and not the placeholder).
    pub fn gpu_handle(&self) -> Option<GpuHandle> {
        if self.is_ready() {
            self.gpu.get().copied()
        } else {
            None
        }
    }

    // --- Transitions (pipeline only) ---

    fn transition(&self, from: TextureState, to: TextureState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn begin_decode(&self) -> bool {
        self.transition(TextureState::Pending, TextureState::Decoding)
    }

    pub(crate) fn finish_decode(&self, width: u32, height: u32) -> bool {
        if self.state() != TextureState::Decoding || self.dims.set((width, height)).is_err() {
            return false;
        }
        self.transition(TextureState::Decoding, TextureState::Decoded)
    }

    pub(crate) fn finish_upload(&self, handle: GpuHandle) -> bool {
        if self.state() != TextureState::Decoded || self.gpu.set(handle).is_err() {
            return false;
        }
        self.transition(TextureState::Decoded, TextureState::Ready)
    }

    /// Parks the record in `Failed`. Never overrides `Ready`.
    pub(crate) fn mark_failed(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != TextureState::Ready as u8).then_some(TextureState::Failed as u8)
            });
    }
}

static EMPTY: LazyLock<Arc<TextureRecord>> = LazyLock::new(|| Arc::new(TextureRecord::empty()));

impl fmt::Debug for TextureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureRecord")
            .field("path", &self.canonical_path)
            .field("state", &self.state())
            .field("dims", &self.dims())
            .field("gpu", &self.gpu.get())
            .finish()
    }
}
