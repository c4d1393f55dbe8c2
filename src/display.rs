//! Display initialization and backend selection.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::api::Driver;
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::share::ShareRegistry;

#[cfg(wgl_backend)]
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Force the hold release policy process wide, for driver workarounds that
/// have to be applied without touching application code.
static FORCE_HOLD_POLICY: Lazy<bool> =
    Lazy::new(|| std::env::var_os("GLAZE_NO_CONTEXT_RELEASE").is_some());

/// What [`Context::release`] does to the native binding.
///
/// [`Context::release`]: crate::context::Context::release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Detach the native context from the thread on every release.
    Flush,

    /// Keep the native binding in place when the released context is still
    /// the active one on the thread, skipping a rebind on the next acquire.
    /// Works around drivers that stall on repeated make-current cycles.
    Hold,
}

impl ReleasePolicy {
    fn default_from_env() -> Self {
        if *FORCE_HOLD_POLICY {
            ReleasePolicy::Hold
        } else {
            ReleasePolicy::Flush
        }
    }
}

/// The backend to create a [`Display`] with.
///
/// The set is closed and selected explicitly; there is no runtime platform
/// guessing.
#[non_exhaustive]
pub enum Backend {
    /// The Windows WGL backend.
    ///
    /// The optional native window is used for extension loading; without it
    /// only the legacy pixel format path is available.
    #[cfg(wgl_backend)]
    Wgl { display: RawDisplayHandle, native_window: Option<RawWindowHandle> },

    /// The in-process software backend.
    #[cfg(headless_backend)]
    Headless(crate::api::headless::Device),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            #[cfg(wgl_backend)]
            Backend::Wgl { .. } => "Wgl",
            #[cfg(headless_backend)]
            Backend::Headless(_) => "Headless",
        };
        f.write_str(name)
    }
}

/// A connection to a rendering backend: the entry point for negotiating
/// configs and creating surfaces and contexts.
///
/// The display owns the share registry and the release policy, so their
/// lifetime is that of the display rather than the process.
#[derive(Debug, Clone)]
pub struct Display {
    pub(crate) inner: Arc<DisplayInner>,
}

impl Display {
    /// Create a display for the given backend, with the release policy taken
    /// from the environment.
    ///
    /// # Safety
    ///
    /// Native handles carried by the backend value must be valid.
    pub unsafe fn new(backend: Backend) -> Result<Self> {
        Self::with_policy(backend, ReleasePolicy::default_from_env())
    }

    /// Create a display with an explicit release policy.
    ///
    /// # Safety
    ///
    /// Native handles carried by the backend value must be valid.
    pub unsafe fn with_policy(backend: Backend, release_policy: ReleasePolicy) -> Result<Self> {
        let driver: Box<dyn Driver> = match backend {
            #[cfg(wgl_backend)]
            Backend::Wgl { display, native_window } => {
                Box::new(crate::api::wgl::Display::new(display, native_window)?)
            },
            #[cfg(headless_backend)]
            Backend::Headless(device) => Box::new(crate::api::headless::Display::new(device)),
        };

        log::debug!("created {} display with {release_policy:?} release policy", driver.name());

        Ok(Display {
            inner: Arc::new(DisplayInner {
                driver,
                registry: ShareRegistry::default(),
                release_policy,
            }),
        })
    }

    /// Create a display backed by the in-process software device.
    #[cfg(headless_backend)]
    pub fn new_headless(device: crate::api::headless::Device) -> Self {
        // No native handles are involved, so this cannot actually fail.
        unsafe { Self::new(Backend::Headless(device)) }.expect("headless display creation")
    }

    /// The name of the backend driving this display.
    pub fn backend_name(&self) -> &'static str {
        self.inner.driver.name()
    }

    /// Record that two contexts of this display intend to share display
    /// lists and textures, regardless of whether either has been created
    /// natively yet.
    pub fn register_sharing(&self, a: &Context, b: &Context) -> Result<()> {
        if a.inner.display() != self || b.inner.display() != self {
            return Err(ErrorKind::BadContext.into());
        }

        self.inner.registry.register_sharing(&a.inner, &b.inner);
        Ok(())
    }

    pub(crate) fn driver(&self) -> &dyn Driver {
        self.inner.driver.as_ref()
    }

    pub(crate) fn share_registry(&self) -> &ShareRegistry {
        &self.inner.registry
    }

    pub(crate) fn release_policy(&self) -> ReleasePolicy {
        self.inner.release_policy
    }
}

impl PartialEq for Display {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Display {}

pub(crate) struct DisplayInner {
    driver: Box<dyn Driver>,
    registry: ShareRegistry,
    release_policy: ReleasePolicy,
}

impl fmt::Debug for DisplayInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("backend", &self.driver.name())
            .field("release_policy", &self.release_policy)
            .finish()
    }
}
