//! The `Driver` implementation over the software device.

use std::ffi::c_void;
use std::thread;

use raw_window_handle::RawWindowHandle;

use super::device::{window_id, ContextRecord, Device, SurfaceRecord};
use super::format::FormatDescriptor;
use crate::api::{Driver, QueryPath, RawContext, RawFormat, RawSurface};
use crate::config::Capabilities;
use crate::error::{ErrorKind, Result};
use crate::proc_table::Command;
use crate::surface::{LockStatus, SurfaceKind};

/// Every resolvable symbol points here; the backend never executes GL
/// commands, it only accounts for them.
extern "C" fn stub_entry_point() {}

#[derive(Debug)]
pub(crate) struct Display {
    device: Device,
}

impl Display {
    pub(crate) fn new(device: Device) -> Self {
        Display { device }
    }

    fn format(&self, format: RawFormat) -> Result<&FormatDescriptor> {
        let index = format.0 - 1;
        usize::try_from(index)
            .ok()
            .and_then(|index| self.device.inner.formats.get(index))
            .ok_or_else(|| ErrorKind::BadConfig.into())
    }

    fn formats_for(&self, path: QueryPath) -> impl Iterator<Item = (RawFormat, &FormatDescriptor)> {
        self.device
            .inner
            .formats
            .iter()
            .enumerate()
            .map(|(index, descriptor)| (RawFormat(index as i64 + 1), descriptor))
            .filter(move |(_, descriptor)| match path {
                // Pbuffer-only formats are invisible to the legacy query.
                QueryPath::Legacy => descriptor.draw_to_window || descriptor.draw_to_bitmap,
                QueryPath::Extended => true,
            })
    }

    fn gl_extension_enabled(&self, extension: &str) -> bool {
        self.device.inner.gl_extensions.split_whitespace().any(|name| name == extension)
    }

    /// Whether the requested float flavor admits this descriptor, honoring
    /// the ARB-over-NV precedence.
    fn float_admissible(&self, descriptor: &FormatDescriptor, requested: &Capabilities) -> bool {
        if !requested.float_pixels() {
            return !descriptor.float_components;
        }

        if self.device.inner.arb_float {
            descriptor.float_components && !descriptor.nv_float
        } else if self.device.inner.nv_float {
            descriptor.float_components && descriptor.nv_float
        } else {
            false
        }
    }
}

/// Distance of a descriptor from the request; the driver's own nearest-match
/// selection used for format recommendations.
fn mismatch(descriptor: &FormatDescriptor, requested: &Capabilities, path: QueryPath) -> Option<u32> {
    if descriptor.double_buffer != requested.double_buffer()
        || descriptor.stereo != requested.stereo()
    {
        return None;
    }

    let diff = |a: u8, b: u8| a.abs_diff(b) as u32;

    let mut score = diff(descriptor.red_bits, requested.red_size())
        + diff(descriptor.green_bits, requested.green_size())
        + diff(descriptor.blue_bits, requested.blue_size())
        + diff(descriptor.alpha_bits, requested.alpha_size())
        + diff(descriptor.depth_bits, requested.depth_size())
        + diff(descriptor.stencil_bits, requested.stencil_size());

    if path == QueryPath::Extended {
        let wanted = requested.num_samples().unwrap_or(0);
        let got = if descriptor.sample_buffers { descriptor.samples } else { 0 };
        score += 4 * diff(got, wanted);
    }

    Some(score)
}

impl Driver for Display {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn supports_extended_query(&self) -> bool {
        self.device.inner.arb_pixel_format
    }

    fn surface_format(&self, window: RawWindowHandle) -> Result<Option<RawFormat>> {
        let id = window_id(window).ok_or(ErrorKind::BadNativeWindow)?;
        let state = self.device.inner.state.lock().unwrap();
        let record = state.windows.get(&id).ok_or(ErrorKind::BadNativeWindow)?;
        Ok(record.format.map(RawFormat))
    }

    fn recommended_format(
        &self,
        _window: Option<RawWindowHandle>,
        requested: &Capabilities,
        path: QueryPath,
    ) -> Result<Option<RawFormat>> {
        let recommended = self
            .formats_for(path)
            .filter(|(_, descriptor)| match path {
                QueryPath::Legacy => !descriptor.float_components,
                QueryPath::Extended => self.float_admissible(descriptor, requested),
            })
            .filter_map(|(format, descriptor)| {
                mismatch(descriptor, requested, path).map(|score| (score, format))
            })
            .min_by_key(|(score, _)| *score)
            .map(|(_, format)| format);

        Ok(recommended)
    }

    fn enumerate_formats(
        &self,
        _window: Option<RawWindowHandle>,
        path: QueryPath,
    ) -> Result<Vec<(RawFormat, Capabilities)>> {
        Ok(self
            .formats_for(path)
            .map(|(format, descriptor)| (format, descriptor.to_capabilities(path)))
            .collect())
    }

    fn describe_format(
        &self,
        _window: Option<RawWindowHandle>,
        format: RawFormat,
    ) -> Result<Capabilities> {
        let path = if self.device.inner.arb_pixel_format {
            QueryPath::Extended
        } else {
            QueryPath::Legacy
        };
        Ok(self.format(format)?.to_capabilities(path))
    }

    fn choose_pbuffer_format(
        &self,
        requested: &Capabilities,
    ) -> Result<(RawFormat, Capabilities)> {
        if !self.device.inner.arb_pixel_format {
            return Err(ErrorKind::NotSupported("pbuffer support is not available").into());
        }
        if requested.float_pixels() && !self.device.inner.arb_float && !self.device.inner.nv_float
        {
            return Err(ErrorKind::NotSupported("float pbuffer support is not available").into());
        }

        let chosen = self
            .formats_for(QueryPath::Extended)
            .filter(|(_, descriptor)| descriptor.draw_to_pbuffer)
            .filter(|(_, descriptor)| self.float_admissible(descriptor, requested))
            .filter(|(_, descriptor)| !requested.render_to_texture() || descriptor.bind_to_texture)
            .filter(|(_, descriptor)| {
                !requested.render_to_texture_rectangle() || descriptor.bind_to_texture_rectangle
            })
            .filter_map(|(format, descriptor)| {
                mismatch(descriptor, requested, QueryPath::Extended)
                    .map(|score| (score, format, descriptor))
            })
            .min_by_key(|(score, ..)| *score);

        let (_, format, descriptor) = chosen.ok_or(ErrorKind::NoAvailablePixelFormat)?;
        Ok((format, descriptor.to_capabilities(QueryPath::Extended)))
    }

    fn create_window_surface(
        &self,
        window: RawWindowHandle,
        format: RawFormat,
    ) -> Result<RawSurface> {
        self.format(format)?;
        let id = window_id(window).ok_or(ErrorKind::BadNativeWindow)?;

        let mut state = self.device.inner.state.lock().unwrap();
        let record = state.windows.get_mut(&id).ok_or(ErrorKind::BadNativeWindow)?;

        if record.applied {
            return Err(ErrorKind::PixelFormatAlreadySet.into());
        }
        match record.format {
            Some(assigned) if assigned != format.0 => {
                // The window was configured externally with something else.
                return Err(ErrorKind::PixelFormatAlreadySet.into());
            },
            _ => (),
        }
        record.format = Some(format.0);
        record.applied = true;
        let (width, height) = (record.width, record.height);

        let surface = state.next_id();
        state.surfaces.insert(
            surface,
            SurfaceRecord {
                kind: SurfaceKind::Window,
                format: format.0,
                width,
                height,
                window: Some(id),
                locked: false,
                swaps: 0,
            },
        );
        Ok(RawSurface(surface))
    }

    fn create_pixmap_surface(
        &self,
        format: RawFormat,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        self.format(format)?;

        let mut state = self.device.inner.state.lock().unwrap();
        let surface = state.next_id();
        state.surfaces.insert(
            surface,
            SurfaceRecord {
                kind: SurfaceKind::Pixmap,
                format: format.0,
                width,
                height,
                window: None,
                locked: false,
                swaps: 0,
            },
        );
        Ok(RawSurface(surface))
    }

    fn create_pbuffer_surface(
        &self,
        format: RawFormat,
        _capabilities: &Capabilities,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        let descriptor = self.format(format)?;
        if !descriptor.draw_to_pbuffer {
            return Err(ErrorKind::BadConfig.into());
        }

        let mut state = self.device.inner.state.lock().unwrap();
        let surface = state.next_id();
        state.surfaces.insert(
            surface,
            SurfaceRecord {
                kind: SurfaceKind::Pbuffer,
                format: format.0,
                width,
                height,
                window: None,
                locked: false,
                swaps: 0,
            },
        );
        Ok(RawSurface(surface))
    }

    fn destroy_surface(&self, surface: RawSurface) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        state.surfaces.remove(&surface.0).ok_or(ErrorKind::BadSurface)?;
        Ok(())
    }

    fn surface_realized(&self, surface: RawSurface) -> bool {
        let state = self.device.inner.state.lock().unwrap();
        match state.surfaces.get(&surface.0) {
            Some(record) => match record.window {
                Some(window) => state.windows.get(&window).map_or(false, |window| window.realized),
                // Offscreen surfaces exist as soon as they're created.
                None => true,
            },
            None => false,
        }
    }

    fn surface_size(&self, surface: RawSurface) -> Result<(u32, u32)> {
        let state = self.device.inner.state.lock().unwrap();
        let record = state.surfaces.get(&surface.0).ok_or(ErrorKind::BadSurface)?;
        match record.window {
            Some(window) => {
                let window = state.windows.get(&window).ok_or(ErrorKind::BadNativeWindow)?;
                Ok((window.width, window.height))
            },
            None => Ok((record.width, record.height)),
        }
    }

    fn resize_surface(&self, surface: RawSurface, width: u32, height: u32) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        let record = state.surfaces.get_mut(&surface.0).ok_or(ErrorKind::BadSurface)?;
        record.width = width;
        record.height = height;
        if let Some(window) = record.window {
            if let Some(window) = state.windows.get_mut(&window) {
                window.width = width;
                window.height = height;
            }
        }
        Ok(())
    }

    fn swap_buffers(&self, surface: RawSurface) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        let record = state.surfaces.get_mut(&surface.0).ok_or(ErrorKind::BadSurface)?;
        record.swaps += 1;
        Ok(())
    }

    fn lock_surface(&self, surface: RawSurface) -> Result<LockStatus> {
        if !self.surface_realized(surface) {
            return Ok(LockStatus::NotReady);
        }

        let mut state = self.device.inner.state.lock().unwrap();
        let window = {
            let record = state.surfaces.get_mut(&surface.0).ok_or(ErrorKind::BadSurface)?;
            record.locked = true;
            record.window
        };

        let changed = window
            .and_then(|window| state.windows.get_mut(&window))
            .map(|window| std::mem::take(&mut window.changed));

        Ok(if changed.unwrap_or(false) { LockStatus::Changed } else { LockStatus::Ready })
    }

    fn unlock_surface(&self, surface: RawSurface) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        let record = state.surfaces.get_mut(&surface.0).ok_or(ErrorKind::BadSurface)?;
        if !record.locked {
            return Err(ErrorKind::BadAccess.into());
        }
        record.locked = false;
        Ok(())
    }

    fn create_context(
        &self,
        surface: RawSurface,
        format: RawFormat,
        share: Option<RawContext>,
    ) -> Result<RawContext> {
        self.format(format)?;

        let mut state = self.device.inner.state.lock().unwrap();
        if !state.surfaces.contains_key(&surface.0) {
            return Err(ErrorKind::BadSurface.into());
        }

        // Sharing is wired in the same call that creates the context. When
        // the share source is gone nothing is created at all.
        if let Some(share) = share {
            if !state.contexts.contains_key(&share.0) {
                return Err(ErrorKind::BadContext.into());
            }
        }

        let context = state.next_id();
        state.contexts.insert(
            context,
            ContextRecord { share_source: share.map(|share| share.0), swap_interval: 1 },
        );
        Ok(RawContext(context))
    }

    fn make_current(&self, context: RawContext, surface: RawSurface) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.device.inner.state.lock().unwrap();

        if !state.contexts.contains_key(&context.0) {
            return Err(ErrorKind::BadContext.into());
        }
        if !state.surfaces.contains_key(&surface.0) {
            return Err(ErrorKind::BadSurface.into());
        }

        // A context can be current on one thread at most; real drivers fail
        // this call the same way.
        let held_elsewhere = state
            .current
            .iter()
            .any(|(thread, current)| *current == context.0 && *thread != me);
        if held_elsewhere {
            return Err(ErrorKind::BadAccess.into());
        }

        state.current.insert(me, context.0);
        Ok(())
    }

    fn release_current(&self) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        state.current.remove(&thread::current().id());
        Ok(())
    }

    fn current_context(&self) -> Option<RawContext> {
        let state = self.device.inner.state.lock().unwrap();
        state.current.get(&thread::current().id()).copied().map(RawContext)
    }

    fn destroy_context(&self, context: RawContext) -> Result<()> {
        let mut state = self.device.inner.state.lock().unwrap();
        if state.current.values().any(|current| *current == context.0) {
            return Err(ErrorKind::BadAccess.into());
        }
        state.contexts.remove(&context.0).ok_or(ErrorKind::BadContext)?;
        Ok(())
    }

    fn set_swap_interval(&self, context: RawContext, interval: u32) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.device.inner.state.lock().unwrap();
        if state.current.get(&me) != Some(&context.0) {
            return Err(ErrorKind::BadContextState.into());
        }
        let record = state.contexts.get_mut(&context.0).ok_or(ErrorKind::BadContext)?;
        record.swap_interval = interval;
        Ok(())
    }

    fn get_proc_address(&self, name: &str) -> *const c_void {
        if self.device.inner.suppressed_symbols.contains(name) {
            return std::ptr::null();
        }

        // The early core API is exported statically.
        if crate::proc_table::CoreEntryPoints::contains(name) {
            return stub_entry_point as *const c_void;
        }

        // The generic spellings of platform-renamed functions have no native
        // symbol here; the mapped name has to be used.
        if self.map_symbol(name).is_some() {
            return std::ptr::null();
        }

        let resolvable = match name {
            "swAllocateMemoryNV" | "swFreeMemoryNV" => {
                self.gl_extension_enabled("GL_NV_vertex_array_range")
            },
            _ => match Command::from_symbol(name) {
                Some(command) => command
                    .extension()
                    .map_or(true, |extension| self.gl_extension_enabled(extension)),
                None => false,
            },
        };

        if resolvable {
            stub_entry_point as *const c_void
        } else {
            std::ptr::null()
        }
    }

    fn gl_extensions(&self) -> String {
        self.device.inner.gl_extensions.clone()
    }

    fn platform_extensions(&self) -> String {
        self.device.inner.platform_extensions.clone()
    }

    fn map_symbol(&self, name: &str) -> Option<&'static str> {
        match name {
            "glAllocateMemoryNV" => Some("swAllocateMemoryNV"),
            "glFreeMemoryNV" => Some("swFreeMemoryNV"),
            _ => None,
        }
    }
}
