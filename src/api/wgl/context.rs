//! WGL context creation.

use std::io::Error as IoError;
use std::os::raw::c_int;

use windows_sys::Win32::Graphics::OpenGL::{self as gl, HGLRC};

use super::display::Display;
use crate::api::{RawContext, RawFormat, RawSurface};
use crate::error::Result;

impl Display {
    /// Create a native context on the surface.
    ///
    /// Sharing is atomic either way: `wglCreateContextAttribsARB` takes the
    /// share context in the creation call, and on the legacy path a failed
    /// `wglShareLists` tears the fresh context down again, so no context
    /// exists that half-shares.
    pub(super) fn create_context(
        &self,
        surface: RawSurface,
        _format: RawFormat,
        share: Option<RawContext>,
    ) -> Result<RawContext> {
        let hdc = self.surface_hdc(surface)?;
        let share = share.map_or(0, |share| share.0 as HGLRC);

        let use_arb = self.has_client_extension("WGL_ARB_create_context")
            && self.wgl_extra.CreateContextAttribsARB.is_some();

        let context = if use_arb {
            let create = self.wgl_extra.CreateContextAttribsARB.unwrap();
            // No version or profile is forced; the driver picks the most
            // capable compatibility context, like the legacy call does.
            let attrs: [c_int; 1] = [0];

            let raw = unsafe { create(hdc, share, attrs.as_ptr()) };
            if raw == 0 {
                return Err(IoError::last_os_error().into());
            }
            raw
        } else {
            unsafe {
                let raw = gl::wglCreateContext(hdc);
                if raw == 0 {
                    return Err(IoError::last_os_error().into());
                }

                if share != 0 && gl::wglShareLists(share, raw) == 0 {
                    let err = IoError::last_os_error();
                    gl::wglDeleteContext(raw);
                    return Err(err.into());
                }

                raw
            }
        };

        Ok(RawContext(context as u64))
    }
}
