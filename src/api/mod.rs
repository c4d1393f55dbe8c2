//! The closed set of platform backends.

#[cfg(headless_backend)]
pub mod headless;
#[cfg(wgl_backend)]
pub mod wgl;

use std::ffi::c_void;
use std::fmt;

use raw_window_handle::RawWindowHandle;

use crate::config::Capabilities;
use crate::error::Result;
use crate::surface::LockStatus;

/// Native pixel format id. On WGL this is the pixel format index, other
/// backends use their own descriptor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawFormat(pub i64);

/// Opaque native rendering context handle. Always non-zero for a created
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawContext(pub u64);

/// Opaque native surface handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawSurface(pub u64);

/// Which pixel format query api to enumerate candidates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryPath {
    /// The coarse legacy descriptor enumeration. Can't see multisampling or
    /// pbuffer suitability.
    Legacy,

    /// The extension based query with precise per-format attributes.
    Extended,
}

/// The platform driver interface.
///
/// One implementation per backend; selection happens through the explicit
/// [`Backend`] factory on display creation, never through runtime platform
/// sniffing.
///
/// [`Backend`]: crate::display::Backend
pub(crate) trait Driver: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    // Pixel format negotiation.

    /// Whether the extended (ARB style) pixel format query is available.
    fn supports_extended_query(&self) -> bool;

    /// The pixel format already assigned to the window by an external layer,
    /// if any.
    fn surface_format(&self, window: RawWindowHandle) -> Result<Option<RawFormat>>;

    /// The platform's own suggestion for the request, if it produced one.
    fn recommended_format(
        &self,
        window: Option<RawWindowHandle>,
        requested: &Capabilities,
        path: QueryPath,
    ) -> Result<Option<RawFormat>>;

    /// Enumerate every available format with the capabilities the given
    /// query path can see.
    fn enumerate_formats(
        &self,
        window: Option<RawWindowHandle>,
        path: QueryPath,
    ) -> Result<Vec<(RawFormat, Capabilities)>>;

    /// Resolve a format to the capabilities its native descriptor reports.
    fn describe_format(
        &self,
        window: Option<RawWindowHandle>,
        format: RawFormat,
    ) -> Result<Capabilities>;

    /// Choose a pbuffer-capable format through the extended query.
    fn choose_pbuffer_format(&self, requested: &Capabilities)
        -> Result<(RawFormat, Capabilities)>;

    // Surfaces.

    /// Create a window surface, applying the format to the native window.
    /// Fails with [`ErrorKind::PixelFormatAlreadySet`] when the window was
    /// configured before.
    ///
    /// [`ErrorKind::PixelFormatAlreadySet`]: crate::error::ErrorKind::PixelFormatAlreadySet
    fn create_window_surface(
        &self,
        window: RawWindowHandle,
        format: RawFormat,
    ) -> Result<RawSurface>;

    fn create_pixmap_surface(&self, format: RawFormat, width: u32, height: u32)
        -> Result<RawSurface>;

    fn create_pbuffer_surface(
        &self,
        format: RawFormat,
        capabilities: &Capabilities,
        width: u32,
        height: u32,
    ) -> Result<RawSurface>;

    fn destroy_surface(&self, surface: RawSurface) -> Result<()>;

    /// Whether the underlying native surface exists and is ready for
    /// rendering. An unrealized surface defers context work instead of
    /// failing it.
    fn surface_realized(&self, surface: RawSurface) -> bool;

    fn surface_size(&self, surface: RawSurface) -> Result<(u32, u32)>;

    fn resize_surface(&self, surface: RawSurface, width: u32, height: u32) -> Result<()>;

    fn swap_buffers(&self, surface: RawSurface) -> Result<()>;

    fn lock_surface(&self, surface: RawSurface) -> Result<LockStatus>;

    fn unlock_surface(&self, surface: RawSurface) -> Result<()>;

    // Contexts.

    /// Create a native context for the surface, atomically wired for sharing
    /// with `share` when given. Either the whole call succeeds or no context
    /// exists; there is no partially shared state.
    fn create_context(
        &self,
        surface: RawSurface,
        format: RawFormat,
        share: Option<RawContext>,
    ) -> Result<RawContext>;

    fn make_current(&self, context: RawContext, surface: RawSurface) -> Result<()>;

    /// Detach whatever context is current on the calling thread.
    fn release_current(&self) -> Result<()>;

    /// The context the driver reports current on the calling thread.
    fn current_context(&self) -> Option<RawContext>;

    fn destroy_context(&self, context: RawContext) -> Result<()>;

    /// Set the swap interval of the current context.
    fn set_swap_interval(&self, context: RawContext, interval: u32) -> Result<()>;

    // Entry points and extensions.

    /// Resolve a native entry point. Returns null for unknown symbols, the
    /// availability query is separate by design.
    fn get_proc_address(&self, name: &str) -> *const c_void;

    /// The GL extension string of the current context.
    fn gl_extensions(&self) -> String;

    /// The platform (window system) extension string.
    fn platform_extensions(&self) -> String;

    /// Map a generic function name to its platform specific native name, if
    /// the platform renames it.
    fn map_symbol(&self, name: &str) -> Option<&'static str>;
}
