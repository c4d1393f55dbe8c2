//! Drawable surfaces: windows, offscreen pixmaps and pbuffers.

use std::fmt;
use std::sync::{Arc, Mutex};

use raw_window_handle::RawWindowHandle;

use crate::api::RawSurface;
use crate::config::{Config, SurfaceTypes};
use crate::display::Display;
use crate::error::{ErrorKind, Result};

/// The kind of the native surface backing a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// An onscreen window surface.
    Window,

    /// An offscreen native bitmap surface.
    Pixmap,

    /// A pbuffer surface, optionally usable as a texture source.
    Pbuffer,
}

/// The outcome of a surface lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The surface is locked and ready.
    Ready,

    /// The surface is locked, but its native handle changed since the last
    /// lock; cached state derived from the old handle must be dropped.
    Changed,

    /// The surface is not realized yet. Nothing was locked; retry on a later
    /// frame instead of blocking.
    NotReady,
}

/// A native surface together with the configuration chosen for it.
///
/// Cheap to clone; the underlying native resources are released when the
/// last handle goes away.
#[derive(Debug, Clone)]
pub struct Surface {
    pub(crate) inner: Arc<SurfaceInner>,
}

impl Surface {
    /// The configuration the surface was created with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The kind of the native surface.
    #[inline]
    pub fn kind(&self) -> SurfaceKind {
        self.inner.kind
    }

    /// The display the surface belongs to.
    #[inline]
    pub fn display(&self) -> &Display {
        &self.inner.display
    }

    /// Whether the underlying native surface exists and can be rendered to.
    #[inline]
    pub fn is_realized(&self) -> bool {
        self.inner.display.driver().surface_realized(self.inner.raw)
    }

    /// The current size of the surface in pixels.
    pub fn size(&self) -> Result<(u32, u32)> {
        self.inner.display.driver().surface_size(self.inner.raw)
    }

    /// Swap the back and front buffers of the surface.
    pub fn swap_buffers(&self) -> Result<()> {
        self.inner.display.driver().swap_buffers(self.inner.raw)
    }

    /// Acquire the native surface lock.
    ///
    /// Locks are reference counted: nested acquires only bump a hold count,
    /// and the underlying OS resource is taken and released at the outermost
    /// transitions. An unrealized surface reports [`LockStatus::NotReady`]
    /// without blocking or counting.
    pub fn lock(&self) -> Result<LockStatus> {
        let mut state = self.inner.lock.lock().unwrap();
        if state.holds > 0 {
            state.holds += 1;
            return Ok(LockStatus::Ready);
        }

        match self.inner.display.driver().lock_surface(self.inner.raw)? {
            LockStatus::NotReady => Ok(LockStatus::NotReady),
            status => {
                state.holds = 1;
                Ok(status)
            },
        }
    }

    /// Release one hold of the surface lock. Only the outermost release
    /// gives the OS resource back.
    pub fn unlock(&self) -> Result<()> {
        let mut state = self.inner.lock.lock().unwrap();
        if state.holds == 0 {
            return Err(ErrorKind::BadAccess.into());
        }

        state.holds -= 1;
        if state.holds == 0 {
            self.inner.display.driver().unlock_surface(self.inner.raw)?;
        }

        Ok(())
    }

    pub(crate) fn raw(&self) -> RawSurface {
        self.inner.raw
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Surface {}

pub(crate) struct SurfaceInner {
    pub(crate) display: Display,
    pub(crate) config: Config,
    pub(crate) kind: SurfaceKind,
    pub(crate) raw: RawSurface,
    lock: Mutex<LockState>,
}

#[derive(Debug, Default)]
struct LockState {
    holds: u32,
}

impl fmt::Debug for SurfaceInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .field("config", &self.config.format())
            .finish()
    }
}

impl Drop for SurfaceInner {
    fn drop(&mut self) {
        if let Err(err) = self.display.driver().destroy_surface(self.raw) {
            log::warn!("failed to destroy native surface {:?}: {err}", self.raw);
        }
    }
}

impl Display {
    /// Create a surface for an existing native window, applying the chosen
    /// format to it.
    ///
    /// A window's pixel format is applied exactly once for its lifetime;
    /// attempting to configure an already configured window fails with
    /// [`ErrorKind::PixelFormatAlreadySet`].
    ///
    /// # Safety
    ///
    /// The `window` handle must be valid for as long as the surface lives.
    pub unsafe fn create_window_surface(
        &self,
        config: &Config,
        window: RawWindowHandle,
    ) -> Result<Surface> {
        self.check_config(config)?;

        let raw = self.driver().create_window_surface(window, config.format())?;
        Ok(self.wrap_surface(config, SurfaceKind::Window, raw))
    }

    /// Create an offscreen native bitmap surface.
    pub fn create_pixmap_surface(
        &self,
        config: &Config,
        width: u32,
        height: u32,
    ) -> Result<Surface> {
        self.check_config(config)?;

        let raw = self.driver().create_pixmap_surface(config.format(), width, height)?;
        Ok(self.wrap_surface(config, SurfaceKind::Pixmap, raw))
    }

    /// Create a pbuffer surface.
    ///
    /// The config must have been negotiated for pbuffers, see
    /// [`Display::choose_pbuffer_config`].
    ///
    /// [`Display::choose_pbuffer_config`]: crate::display::Display::choose_pbuffer_config
    pub fn create_pbuffer_surface(
        &self,
        config: &Config,
        width: u32,
        height: u32,
    ) -> Result<Surface> {
        self.check_config(config)?;
        if !config.capabilities().surface_types().contains(SurfaceTypes::PBUFFER) {
            return Err(ErrorKind::BadConfig.into());
        }

        let raw = self.driver().create_pbuffer_surface(
            config.format(),
            config.capabilities(),
            width,
            height,
        )?;
        Ok(self.wrap_surface(config, SurfaceKind::Pbuffer, raw))
    }

    fn check_config(&self, config: &Config) -> Result<()> {
        if config.display() != self {
            return Err(ErrorKind::BadConfig.into());
        }
        Ok(())
    }

    fn wrap_surface(&self, config: &Config, kind: SurfaceKind, raw: RawSurface) -> Surface {
        Surface {
            inner: Arc::new(SurfaceInner {
                display: self.clone(),
                config: config.clone(),
                kind,
                raw,
                lock: Mutex::new(LockState::default()),
            }),
        }
    }
}
