//! The software device: configuration and bookkeeping behind the backend.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use raw_window_handle::{RawWindowHandle, WebWindowHandle};

use super::format::{default_formats, FormatDescriptor};
use crate::surface::SurfaceKind;

/// A handle to an in-process software device.
///
/// The device owns the format table and all native records (windows,
/// surfaces, contexts) of the backend. It stays inspectable from the
/// outside, which is what makes automated tests against the backend
/// possible: share wiring, swap intervals and buffer swaps can all be
/// observed after the fact.
#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) inner: Arc<DeviceInner>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    /// A device with the default format table and extension set.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Configure a device before building it.
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Create a native window of the given size. The window starts out
    /// realized.
    pub fn create_window(&self, width: u32, height: u32) -> RawWindowHandle {
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_id();
        state.windows.insert(
            id,
            WindowRecord { width, height, realized: true, format: None, applied: false, changed: false },
        );
        window_handle(id)
    }

    /// Flip whether the window's native surface exists and is renderable.
    pub fn set_window_realized(&self, window: RawWindowHandle, realized: bool) {
        let Some(id) = window_id(window) else { return };
        let mut state = self.inner.state.lock().unwrap();
        if let Some(record) = state.windows.get_mut(&id) {
            record.realized = realized;
        }
    }

    /// Assign a pixel format to the window from the outside, modelling an
    /// external layer that configured the surface before negotiation ran.
    /// `format_index` indexes the device's format table.
    pub fn assign_external_format(&self, window: RawWindowHandle, format_index: usize) {
        let Some(id) = window_id(window) else { return };
        let mut state = self.inner.state.lock().unwrap();
        if let Some(record) = state.windows.get_mut(&id) {
            record.format = Some(format_index as i64 + 1);
        }
    }

    /// Mark the window's native handle as changed, so the next surface lock
    /// reports [`LockStatus::Changed`].
    ///
    /// [`LockStatus::Changed`]: crate::surface::LockStatus::Changed
    pub fn mark_window_changed(&self, window: RawWindowHandle) {
        let Some(id) = window_id(window) else { return };
        let mut state = self.inner.state.lock().unwrap();
        if let Some(record) = state.windows.get_mut(&id) {
            record.changed = true;
        }
    }

    /// The native handle the given context was share-wired through at
    /// creation, if any.
    pub fn share_source(&self, raw_context: u64) -> Option<u64> {
        let state = self.inner.state.lock().unwrap();
        state.contexts.get(&raw_context).and_then(|record| record.share_source)
    }

    /// Whether a native context with the handle currently exists.
    pub fn context_exists(&self, raw_context: u64) -> bool {
        self.inner.state.lock().unwrap().contexts.contains_key(&raw_context)
    }

    /// The swap interval last set on the context.
    pub fn swap_interval(&self, raw_context: u64) -> Option<u32> {
        let state = self.inner.state.lock().unwrap();
        state.contexts.get(&raw_context).map(|record| record.swap_interval)
    }

    /// How many times buffers were swapped on any surface of this window.
    pub fn swap_count(&self, window: RawWindowHandle) -> u64 {
        let Some(id) = window_id(window) else { return 0 };
        let state = self.inner.state.lock().unwrap();
        state
            .surfaces
            .values()
            .filter(|surface| surface.window == Some(id))
            .map(|surface| surface.swaps)
            .sum()
    }
}

/// Builder for [`Device`].
pub struct DeviceBuilder {
    formats: Vec<FormatDescriptor>,
    arb_pixel_format: bool,
    arb_float: bool,
    nv_float: bool,
    gl_extensions: Vec<String>,
    suppressed_symbols: HashSet<String>,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        DeviceBuilder {
            formats: default_formats(),
            arb_pixel_format: true,
            arb_float: true,
            nv_float: false,
            gl_extensions: [
                "GL_ARB_multitexture",
                "GL_ARB_multisample",
                "GL_ARB_vertex_buffer_object",
                "GL_EXT_framebuffer_object",
                "GL_NV_vertex_array_range",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            suppressed_symbols: HashSet::new(),
        }
    }
}

impl fmt::Debug for DeviceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuilder")
            .field("formats", &self.formats.len())
            .field("arb_pixel_format", &self.arb_pixel_format)
            .finish()
    }
}

impl DeviceBuilder {
    /// Replace the format table.
    pub fn formats(mut self, formats: Vec<FormatDescriptor>) -> Self {
        self.formats = formats;
        self
    }

    /// Whether the extended pixel format query exists. Turning it off
    /// models an old driver that only speaks the legacy path.
    pub fn arb_pixel_format(mut self, available: bool) -> Self {
        self.arb_pixel_format = available;
        self
    }

    /// Whether ARB float pixel formats are available.
    pub fn arb_float(mut self, available: bool) -> Self {
        self.arb_float = available;
        self
    }

    /// Whether NV float buffers are available.
    pub fn nv_float(mut self, available: bool) -> Self {
        self.nv_float = available;
        self
    }

    /// Replace the GL extension list the device reports.
    pub fn gl_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.gl_extensions = extensions.into_iter().map(str::to_owned).collect();
        self
    }

    /// Make a symbol unresolvable even when its extension is advertised.
    /// Models a broken driver table.
    pub fn suppress_symbol(mut self, symbol: &str) -> Self {
        self.suppressed_symbols.insert(symbol.to_owned());
        self
    }

    /// Build the device.
    pub fn build(self) -> Device {
        let mut platform_extensions = Vec::new();
        if self.arb_pixel_format {
            platform_extensions.extend(["SW_ARB_pixel_format", "SW_ARB_pbuffer", "SW_ARB_render_texture"]);
        }
        if self.arb_float {
            platform_extensions.push("SW_ARB_pixel_format_float");
        }
        if self.nv_float {
            platform_extensions.push("SW_NV_float_buffer");
        }

        Device {
            inner: Arc::new(DeviceInner {
                formats: self.formats,
                arb_pixel_format: self.arb_pixel_format,
                arb_float: self.arb_float,
                nv_float: self.nv_float,
                gl_extensions: self.gl_extensions.join(" "),
                platform_extensions: platform_extensions.join(" "),
                suppressed_symbols: self.suppressed_symbols,
                state: Mutex::new(DeviceState::default()),
            }),
        }
    }
}

pub(crate) struct DeviceInner {
    pub(crate) formats: Vec<FormatDescriptor>,
    pub(crate) arb_pixel_format: bool,
    pub(crate) arb_float: bool,
    pub(crate) nv_float: bool,
    pub(crate) gl_extensions: String,
    pub(crate) platform_extensions: String,
    pub(crate) suppressed_symbols: HashSet<String>,
    pub(crate) state: Mutex<DeviceState>,
}

impl fmt::Debug for DeviceInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("formats", &self.formats.len())
            .field("arb_pixel_format", &self.arb_pixel_format)
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub(crate) counter: u64,
    pub(crate) windows: HashMap<u64, WindowRecord>,
    pub(crate) surfaces: HashMap<u64, SurfaceRecord>,
    pub(crate) contexts: HashMap<u64, ContextRecord>,
    pub(crate) current: HashMap<ThreadId, u64>,
}

impl DeviceState {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

#[derive(Debug)]
pub(crate) struct WindowRecord {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) realized: bool,
    pub(crate) format: Option<i64>,
    pub(crate) applied: bool,
    pub(crate) changed: bool,
}

#[derive(Debug)]
pub(crate) struct SurfaceRecord {
    pub(crate) kind: SurfaceKind,
    pub(crate) format: i64,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) window: Option<u64>,
    pub(crate) locked: bool,
    pub(crate) swaps: u64,
}

#[derive(Debug)]
pub(crate) struct ContextRecord {
    pub(crate) share_source: Option<u64>,
    pub(crate) swap_interval: u32,
}

pub(crate) fn window_handle(id: u64) -> RawWindowHandle {
    RawWindowHandle::Web(WebWindowHandle::new(id as u32))
}

pub(crate) fn window_id(handle: RawWindowHandle) -> Option<u64> {
    match handle {
        RawWindowHandle::Web(web) => Some(web.id as u64),
        _ => None,
    }
}
