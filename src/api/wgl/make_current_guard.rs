//! Scoped make-current during display bootstrap.

use std::io::Error as IoError;
use std::marker::PhantomData;

use windows_sys::Win32::Graphics::Gdi::HDC;
use windows_sys::Win32::Graphics::OpenGL::{
    wglGetCurrentContext, wglGetCurrentDC, wglMakeCurrent, HGLRC,
};

use crate::error::Result;

/// A guard for when you want to make the context current. Destroying the
/// guard restores the previously current context.
#[derive(Debug)]
pub(super) struct CurrentContextGuard {
    previous_hdc: HDC,
    previous_hglrc: HGLRC,
    // Guards the calling thread's binding, so it must not leave the thread.
    _nosendsync: PhantomData<*mut ()>,
}

impl CurrentContextGuard {
    pub(super) unsafe fn make_current(hdc: HDC, context: HGLRC) -> Result<CurrentContextGuard> {
        let previous_hdc = wglGetCurrentDC();
        let previous_hglrc = wglGetCurrentContext();

        if wglMakeCurrent(hdc, context) == 0 {
            return Err(IoError::last_os_error().into());
        }

        Ok(CurrentContextGuard { previous_hdc, previous_hglrc, _nosendsync: PhantomData })
    }
}

impl Drop for CurrentContextGuard {
    fn drop(&mut self) {
        unsafe {
            wglMakeCurrent(self.previous_hdc, self.previous_hglrc);
        }
    }
}
