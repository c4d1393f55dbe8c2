//! WGL display initialization and driver dispatch.

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::io::Error as IoError;
use std::mem;
use std::sync::Mutex;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use windows_sys::Win32::Foundation::{HMODULE, HWND};
use windows_sys::Win32::Graphics::Gdi::{HBITMAP, HDC, HGDIOBJ};
use windows_sys::Win32::Graphics::OpenGL::{
    self as gl, wglGetCurrentContext, wglGetProcAddress, HGLRC,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{
    create_hidden_window, load_extra_functions, wide_string, HiddenWindow, Pbuffer, WglExtra,
};
use crate::api::{Driver, QueryPath, RawContext, RawFormat, RawSurface};
use crate::config::Capabilities;
use crate::error::{ErrorKind, Result};
use crate::surface::LockStatus;

const GL_EXTENSIONS: u32 = 0x1F03;

/// A WGL display.
pub(crate) struct Display {
    /// `wglGetProcAddress` returns null for functions the system GL library
    /// exports itself; lookups fall back to it.
    pub(super) lib_opengl32: HMODULE,

    pub(super) wgl_extra: WglExtra,

    /// Client WGL extensions, loaded once through the hidden window.
    pub(super) client_extensions: String,

    pub(super) hidden: HiddenWindow,

    pub(super) surfaces: Mutex<SurfaceTable>,
}

unsafe impl Send for Display {}
unsafe impl Sync for Display {}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display").field("extensions", &self.client_extensions).finish()
    }
}

#[derive(Debug, Default)]
pub(super) struct SurfaceTable {
    pub(super) counter: u64,
    pub(super) entries: HashMap<u64, NativeSurface>,
}

impl SurfaceTable {
    pub(super) fn insert(&mut self, surface: NativeSurface) -> RawSurface {
        self.counter += 1;
        self.entries.insert(self.counter, surface);
        RawSurface(self.counter)
    }
}

/// Native resources of one surface. Offscreen kinds own handles that have to
/// be released in reverse order of acquisition, see the drop paths in
/// `surface.rs`.
#[derive(Debug)]
pub(super) enum NativeSurface {
    Window { hwnd: HWND, hdc: HDC },
    Pixmap { hdc: HDC, bitmap: HBITMAP, previous: HGDIOBJ, width: u32, height: u32 },
    Pbuffer { pbuffer: Pbuffer, hdc: HDC, width: u32, height: u32 },
}

impl Display {
    /// Create the WGL display: load `opengl32.dll`, stand up the hidden
    /// window and resolve the extension entry points through it.
    pub(crate) unsafe fn new(
        display: RawDisplayHandle,
        _native_window: Option<RawWindowHandle>,
    ) -> Result<Self> {
        if !matches!(display, RawDisplayHandle::Windows(..)) {
            return Err(ErrorKind::NotSupported("provided native display is not supported").into());
        }

        let name = wide_string("opengl32.dll");
        let lib_opengl32 = LoadLibraryW(name.as_ptr());
        if lib_opengl32 == 0 {
            return Err(ErrorKind::NotFound.into());
        }

        let hidden = create_hidden_window()?;
        let (wgl_extra, client_extensions) = load_extra_functions(&hidden)?;

        Ok(Display {
            lib_opengl32,
            wgl_extra,
            client_extensions,
            hidden,
            surfaces: Mutex::new(SurfaceTable::default()),
        })
    }

    pub(super) fn has_client_extension(&self, extension: &str) -> bool {
        self.client_extensions.split(' ').any(|name| name == extension)
    }

    pub(super) fn surface_hdc(&self, surface: RawSurface) -> Result<HDC> {
        let surfaces = self.surfaces.lock().unwrap();
        match surfaces.entries.get(&surface.0) {
            Some(NativeSurface::Window { hdc, .. })
            | Some(NativeSurface::Pixmap { hdc, .. })
            | Some(NativeSurface::Pbuffer { hdc, .. }) => Ok(*hdc),
            None => Err(ErrorKind::BadSurface.into()),
        }
    }

    pub(super) fn raw_proc_address(&self, name: &str) -> *const std::ffi::c_void {
        let Ok(name) = CString::new(name) else {
            return std::ptr::null();
        };

        unsafe {
            if let Some(address) = wglGetProcAddress(name.as_ptr().cast()) {
                return address as *const std::ffi::c_void;
            }
            match GetProcAddress(self.lib_opengl32, name.as_ptr().cast()) {
                Some(address) => address as *const std::ffi::c_void,
                None => std::ptr::null(),
            }
        }
    }
}

impl Driver for Display {
    fn name(&self) -> &'static str {
        "wgl"
    }

    fn supports_extended_query(&self) -> bool {
        self.wgl_extra.ChoosePixelFormatARB.is_some()
            && self.has_client_extension("WGL_ARB_pixel_format")
    }

    fn surface_format(&self, window: RawWindowHandle) -> Result<Option<RawFormat>> {
        Self::surface_format(self, window)
    }

    fn recommended_format(
        &self,
        window: Option<RawWindowHandle>,
        requested: &Capabilities,
        path: QueryPath,
    ) -> Result<Option<RawFormat>> {
        Self::recommended_format(self, window, requested, path)
    }

    fn enumerate_formats(
        &self,
        window: Option<RawWindowHandle>,
        path: QueryPath,
    ) -> Result<Vec<(RawFormat, Capabilities)>> {
        Self::enumerate_formats(self, window, path)
    }

    fn describe_format(
        &self,
        window: Option<RawWindowHandle>,
        format: RawFormat,
    ) -> Result<Capabilities> {
        Self::describe_format(self, window, format)
    }

    fn choose_pbuffer_format(
        &self,
        requested: &Capabilities,
    ) -> Result<(RawFormat, Capabilities)> {
        Self::choose_pbuffer_format(self, requested)
    }

    fn create_window_surface(
        &self,
        window: RawWindowHandle,
        format: RawFormat,
    ) -> Result<RawSurface> {
        Self::create_window_surface(self, window, format)
    }

    fn create_pixmap_surface(
        &self,
        format: RawFormat,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        Self::create_pixmap_surface(self, format, width, height)
    }

    fn create_pbuffer_surface(
        &self,
        format: RawFormat,
        capabilities: &Capabilities,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        Self::create_pbuffer_surface(self, format, capabilities, width, height)
    }

    fn destroy_surface(&self, surface: RawSurface) -> Result<()> {
        Self::destroy_surface(self, surface)
    }

    fn surface_realized(&self, surface: RawSurface) -> bool {
        Self::surface_realized(self, surface)
    }

    fn surface_size(&self, surface: RawSurface) -> Result<(u32, u32)> {
        Self::surface_size(self, surface)
    }

    fn resize_surface(&self, surface: RawSurface, width: u32, height: u32) -> Result<()> {
        Self::resize_surface(self, surface, width, height)
    }

    fn swap_buffers(&self, surface: RawSurface) -> Result<()> {
        Self::swap_buffers(self, surface)
    }

    fn lock_surface(&self, surface: RawSurface) -> Result<LockStatus> {
        Self::lock_surface(self, surface)
    }

    fn unlock_surface(&self, surface: RawSurface) -> Result<()> {
        Self::unlock_surface(self, surface)
    }

    fn create_context(
        &self,
        surface: RawSurface,
        format: RawFormat,
        share: Option<RawContext>,
    ) -> Result<RawContext> {
        Self::create_context(self, surface, format, share)
    }

    fn make_current(&self, context: RawContext, surface: RawSurface) -> Result<()> {
        let hdc = self.surface_hdc(surface)?;
        unsafe {
            if gl::wglMakeCurrent(hdc, context.0 as HGLRC) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }

    fn release_current(&self) -> Result<()> {
        unsafe {
            if gl::wglMakeCurrent(0, 0) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }

    fn current_context(&self) -> Option<RawContext> {
        match unsafe { wglGetCurrentContext() } {
            0 => None,
            context => Some(RawContext(context as u64)),
        }
    }

    fn destroy_context(&self, context: RawContext) -> Result<()> {
        unsafe {
            if gl::wglDeleteContext(context.0 as HGLRC) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }

    fn set_swap_interval(&self, _context: RawContext, interval: u32) -> Result<()> {
        if !self.has_client_extension("WGL_EXT_swap_control") {
            return Err(ErrorKind::NotSupported("WGL_EXT_swap_control is not present").into());
        }
        let swap_interval = self
            .wgl_extra
            .SwapIntervalEXT
            .ok_or(ErrorKind::NotSupported("WGL_EXT_swap_control is not present"))?;

        unsafe {
            if swap_interval(interval as _) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(())
    }

    fn get_proc_address(&self, name: &str) -> *const std::ffi::c_void {
        self.raw_proc_address(name)
    }

    fn gl_extensions(&self) -> String {
        // glGetString is part of the early core API and comes from the
        // library itself.
        type GetString = unsafe extern "system" fn(name: u32) -> *const std::os::raw::c_char;

        let address = self.raw_proc_address("glGetString");
        if address.is_null() {
            return String::new();
        }

        unsafe {
            let get_string: GetString = mem::transmute(address);
            super::cstr_to_string(get_string(GL_EXTENSIONS))
        }
    }

    fn platform_extensions(&self) -> String {
        self.client_extensions.clone()
    }

    fn map_symbol(&self, name: &str) -> Option<&'static str> {
        // The window system owns these allocators, so their native names
        // carry the wgl prefix.
        match name {
            "glAllocateMemoryNV" => Some("wglAllocateMemoryNV"),
            "glFreeMemoryNV" => Some("wglFreeMemoryNV"),
            _ => None,
        }
    }
}
