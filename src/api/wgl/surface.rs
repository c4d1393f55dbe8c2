//! WGL surface handling: windows, GDI bitmaps and pbuffers.

use std::io::Error as IoError;
use std::mem::{self, MaybeUninit};
use std::os::raw::c_int;

use raw_window_handle::RawWindowHandle;
use windows_sys::Win32::Foundation::RECT;
use windows_sys::Win32::Graphics::Gdi::{
    CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC, SelectObject,
    BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HDC,
};
use windows_sys::Win32::Graphics::OpenGL::{self as gl, PIXELFORMATDESCRIPTOR};
use windows_sys::Win32::UI::WindowsAndMessaging::{GetClientRect, IsWindow};

use super::display::{Display, NativeSurface};
use super::*;
use crate::api::{RawFormat, RawSurface};
use crate::config::Capabilities;
use crate::error::{ErrorKind, Result};
use crate::surface::LockStatus;

impl Display {
    pub(super) fn create_window_surface(
        &self,
        window: RawWindowHandle,
        format: RawFormat,
    ) -> Result<RawSurface> {
        let RawWindowHandle::Win32(window) = window else {
            return Err(ErrorKind::BadNativeWindow.into());
        };
        let hwnd = window.hwnd.get();

        let hdc = unsafe { GetDC(hwnd) };
        if hdc == 0 {
            return Err(ErrorKind::BadNativeWindow.into());
        }

        // A window's format is set exactly once for its lifetime. An equal
        // format assigned by an external layer is accepted as is.
        let assigned = unsafe { gl::GetPixelFormat(hdc) };
        if assigned != 0 {
            if assigned as i64 != format.0 {
                unsafe { ReleaseDC(hwnd, hdc) };
                return Err(ErrorKind::PixelFormatAlreadySet.into());
            }
        } else if let Err(err) = set_pixel_format(hdc, format.0 as c_int) {
            unsafe { ReleaseDC(hwnd, hdc) };
            return Err(err);
        }

        let mut surfaces = self.surfaces.lock().unwrap();
        Ok(surfaces.insert(NativeSurface::Window { hwnd, hdc }))
    }

    pub(super) fn create_pixmap_surface(
        &self,
        format: RawFormat,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        unsafe {
            let hdc = CreateCompatibleDC(0);
            if hdc == 0 {
                return Err(IoError::last_os_error().into());
            }

            let (bitmap, previous) = match create_dib_section(hdc, width, height) {
                Ok(handles) => handles,
                Err(err) => {
                    DeleteDC(hdc);
                    return Err(err);
                },
            };

            if let Err(err) = set_pixel_format(hdc, format.0 as c_int) {
                SelectObject(hdc, previous);
                DeleteObject(bitmap);
                DeleteDC(hdc);
                return Err(err);
            }

            let mut surfaces = self.surfaces.lock().unwrap();
            Ok(surfaces.insert(NativeSurface::Pixmap { hdc, bitmap, previous, width, height }))
        }
    }

    pub(super) fn create_pbuffer_surface(
        &self,
        format: RawFormat,
        capabilities: &Capabilities,
        width: u32,
        height: u32,
    ) -> Result<RawSurface> {
        let create = self
            .wgl_extra
            .CreatePbufferARB
            .ok_or(ErrorKind::NotSupported("pbuffer support is not available"))?;
        let get_dc = self
            .wgl_extra
            .GetPbufferDCARB
            .ok_or(ErrorKind::NotSupported("pbuffer support is not available"))?;

        let mut attrs = Vec::<c_int>::with_capacity(8);
        if capabilities.render_to_texture() {
            attrs.push(WGL_TEXTURE_FORMAT_ARB);
            attrs.push(WGL_TEXTURE_RGBA_ARB);
            attrs.push(WGL_TEXTURE_TARGET_ARB);
            attrs.push(if capabilities.render_to_texture_rectangle() {
                WGL_TEXTURE_RECTANGLE_NV
            } else {
                WGL_TEXTURE_2D_ARB
            });
        } else {
            attrs.push(WGL_TEXTURE_FORMAT_ARB);
            attrs.push(WGL_NO_TEXTURE_ARB);
        }
        attrs.push(0);

        unsafe {
            let pbuffer = create(
                self.hidden.hdc,
                format.0 as c_int,
                width as c_int,
                height as c_int,
                attrs.as_ptr(),
            );
            if pbuffer == 0 {
                return Err(IoError::last_os_error().into());
            }

            let hdc = get_dc(pbuffer);
            if hdc == 0 {
                let err = IoError::last_os_error();
                if let Some(destroy) = self.wgl_extra.DestroyPbufferARB {
                    destroy(pbuffer);
                }
                return Err(err.into());
            }

            let mut surfaces = self.surfaces.lock().unwrap();
            Ok(surfaces.insert(NativeSurface::Pbuffer { pbuffer, hdc, width, height }))
        }
    }

    /// Tear down a surface's native resources, in reverse order of their
    /// acquisition.
    pub(super) fn destroy_surface(&self, surface: RawSurface) -> Result<()> {
        let mut surfaces = self.surfaces.lock().unwrap();
        let surface = surfaces.entries.remove(&surface.0).ok_or(ErrorKind::BadSurface)?;

        unsafe {
            match surface {
                NativeSurface::Window { hwnd, hdc } => {
                    ReleaseDC(hwnd, hdc);
                },
                NativeSurface::Pixmap { hdc, bitmap, previous, .. } => {
                    SelectObject(hdc, previous);
                    DeleteObject(bitmap);
                    DeleteDC(hdc);
                },
                NativeSurface::Pbuffer { pbuffer, hdc, .. } => {
                    if let Some(release_dc) = self.wgl_extra.ReleasePbufferDCARB {
                        release_dc(pbuffer, hdc);
                    }
                    if let Some(destroy) = self.wgl_extra.DestroyPbufferARB {
                        destroy(pbuffer);
                    }
                },
            }
        }

        Ok(())
    }

    pub(super) fn surface_realized(&self, surface: RawSurface) -> bool {
        let surfaces = self.surfaces.lock().unwrap();
        match surfaces.entries.get(&surface.0) {
            Some(NativeSurface::Window { hwnd, .. }) => unsafe { IsWindow(*hwnd) != 0 },
            Some(_) => true,
            None => false,
        }
    }

    pub(super) fn surface_size(&self, surface: RawSurface) -> Result<(u32, u32)> {
        let surfaces = self.surfaces.lock().unwrap();
        match surfaces.entries.get(&surface.0) {
            Some(NativeSurface::Window { hwnd, .. }) => unsafe {
                let mut rect = MaybeUninit::<RECT>::uninit();
                if GetClientRect(*hwnd, rect.as_mut_ptr()) == 0 {
                    return Err(IoError::last_os_error().into());
                }
                let rect = rect.assume_init();
                Ok(((rect.right - rect.left) as u32, (rect.bottom - rect.top) as u32))
            },
            Some(NativeSurface::Pixmap { width, height, .. })
            | Some(NativeSurface::Pbuffer { width, height, .. }) => Ok((*width, *height)),
            None => Err(ErrorKind::BadSurface.into()),
        }
    }

    pub(super) fn resize_surface(
        &self,
        surface: RawSurface,
        new_width: u32,
        new_height: u32,
    ) -> Result<()> {
        let mut surfaces = self.surfaces.lock().unwrap();
        match surfaces.entries.get_mut(&surface.0) {
            // The window server owns the window size.
            Some(NativeSurface::Window { .. }) => Ok(()),
            Some(NativeSurface::Pixmap { hdc, bitmap, width, height, .. }) => unsafe {
                // Selecting the new bitmap hands back the old one.
                let (new_bitmap, old_bitmap) = create_dib_section(*hdc, new_width, new_height)?;
                DeleteObject(old_bitmap);
                *bitmap = new_bitmap;
                *width = new_width;
                *height = new_height;
                Ok(())
            },
            Some(NativeSurface::Pbuffer { .. }) => {
                Err(ErrorKind::NotSupported("pbuffers cannot be resized").into())
            },
            None => Err(ErrorKind::BadSurface.into()),
        }
    }

    pub(super) fn swap_buffers(&self, surface: RawSurface) -> Result<()> {
        let surfaces = self.surfaces.lock().unwrap();
        match surfaces.entries.get(&surface.0) {
            Some(NativeSurface::Window { hdc, .. }) => unsafe {
                if gl::SwapBuffers(*hdc) == 0 {
                    return Err(IoError::last_os_error().into());
                }
                Ok(())
            },
            // Offscreen surfaces are single buffered.
            Some(_) => Ok(()),
            None => Err(ErrorKind::BadSurface.into()),
        }
    }

    pub(super) fn lock_surface(&self, surface: RawSurface) -> Result<LockStatus> {
        if !self.surface_realized(surface) {
            return Ok(LockStatus::NotReady);
        }
        // The device context is held for the surface lifetime, so there is
        // nothing further to acquire.
        Ok(LockStatus::Ready)
    }

    pub(super) fn unlock_surface(&self, _surface: RawSurface) -> Result<()> {
        Ok(())
    }
}

/// Calls `SetPixelFormat` with the format's own descriptor.
unsafe fn set_pixel_format(hdc: HDC, format: c_int) -> Result<()> {
    let mut descriptor = MaybeUninit::<PIXELFORMATDESCRIPTOR>::uninit();
    if gl::DescribePixelFormat(
        hdc,
        format,
        mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32,
        descriptor.as_mut_ptr(),
    ) == 0
    {
        return Err(IoError::last_os_error().into());
    }

    if gl::SetPixelFormat(hdc, format, descriptor.as_ptr()) == 0 {
        return Err(IoError::last_os_error().into());
    }

    Ok(())
}

unsafe fn create_dib_section(hdc: HDC, width: u32, height: u32) -> Result<(isize, isize)> {
    let mut info: BITMAPINFO = mem::zeroed();
    info.bmiHeader = BITMAPINFOHEADER {
        biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth: width as i32,
        // Top-down, to match GL's notion of row order for readbacks.
        biHeight: -(height as i32),
        biPlanes: 1,
        biBitCount: 32,
        biCompression: BI_RGB as u32,
        biSizeImage: 0,
        biXPelsPerMeter: 0,
        biYPelsPerMeter: 0,
        biClrUsed: 0,
        biClrImportant: 0,
    };

    let mut bits = std::ptr::null_mut();
    let bitmap = CreateDIBSection(hdc, &info, DIB_RGB_COLORS, &mut bits, 0, 0);
    if bitmap == 0 {
        return Err(IoError::last_os_error().into());
    }

    let previous = SelectObject(hdc, bitmap);
    Ok((bitmap, previous))
}
