#![cfg(wgl_backend)]

//! The Windows WGL backend.

mod config;
mod context;
mod display;
mod make_current_guard;
mod surface;

pub(crate) use display::Display;

use std::ffi::CString;
use std::io::Error as IoError;
use std::mem;
use std::os::raw::{c_char, c_int};
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::Graphics::Gdi::{GetDC, HDC, ReleaseDC};
use windows_sys::Win32::Graphics::OpenGL::{
    self as gl, wglCreateContext, wglDeleteContext, wglGetProcAddress, HGLRC,
    PIXELFORMATDESCRIPTOR,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassExW, CS_OWNDC, CW_USEDEFAULT,
    WNDCLASSEXW, WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_EX_APPWINDOW, WS_POPUP,
};

use crate::error::{ErrorKind, Result};

use self::make_current_guard::CurrentContextGuard;

/// An `HPBUFFERARB`.
pub(crate) type Pbuffer = isize;

// Pixel format attributes of WGL_ARB_pixel_format and friends.
pub(crate) const WGL_NUMBER_PIXEL_FORMATS_ARB: c_int = 0x2000;
pub(crate) const WGL_DRAW_TO_WINDOW_ARB: c_int = 0x2001;
pub(crate) const WGL_DRAW_TO_BITMAP_ARB: c_int = 0x2002;
pub(crate) const WGL_ACCELERATION_ARB: c_int = 0x2003;
pub(crate) const WGL_SUPPORT_OPENGL_ARB: c_int = 0x2010;
pub(crate) const WGL_DOUBLE_BUFFER_ARB: c_int = 0x2011;
pub(crate) const WGL_STEREO_ARB: c_int = 0x2012;
pub(crate) const WGL_PIXEL_TYPE_ARB: c_int = 0x2013;
pub(crate) const WGL_RED_BITS_ARB: c_int = 0x2015;
pub(crate) const WGL_GREEN_BITS_ARB: c_int = 0x2017;
pub(crate) const WGL_BLUE_BITS_ARB: c_int = 0x2019;
pub(crate) const WGL_ALPHA_BITS_ARB: c_int = 0x201B;
pub(crate) const WGL_ACCUM_RED_BITS_ARB: c_int = 0x201E;
pub(crate) const WGL_ACCUM_GREEN_BITS_ARB: c_int = 0x201F;
pub(crate) const WGL_ACCUM_BLUE_BITS_ARB: c_int = 0x2020;
pub(crate) const WGL_ACCUM_ALPHA_BITS_ARB: c_int = 0x2021;
pub(crate) const WGL_DEPTH_BITS_ARB: c_int = 0x2022;
pub(crate) const WGL_STENCIL_BITS_ARB: c_int = 0x2023;
pub(crate) const WGL_NO_ACCELERATION_ARB: c_int = 0x2025;
pub(crate) const WGL_FULL_ACCELERATION_ARB: c_int = 0x2027;
pub(crate) const WGL_TYPE_RGBA_ARB: c_int = 0x202B;
pub(crate) const WGL_TYPE_RGBA_FLOAT_ARB: c_int = 0x21A0;
pub(crate) const WGL_DRAW_TO_PBUFFER_ARB: c_int = 0x202D;
pub(crate) const WGL_SAMPLE_BUFFERS_ARB: c_int = 0x2041;
pub(crate) const WGL_SAMPLES_ARB: c_int = 0x2042;
pub(crate) const WGL_BIND_TO_TEXTURE_RGB_ARB: c_int = 0x2070;
pub(crate) const WGL_BIND_TO_TEXTURE_RGBA_ARB: c_int = 0x2071;
pub(crate) const WGL_TEXTURE_FORMAT_ARB: c_int = 0x2072;
pub(crate) const WGL_TEXTURE_TARGET_ARB: c_int = 0x2073;
pub(crate) const WGL_TEXTURE_RGBA_ARB: c_int = 0x2076;
pub(crate) const WGL_NO_TEXTURE_ARB: c_int = 0x2077;
pub(crate) const WGL_TEXTURE_2D_ARB: c_int = 0x207A;
pub(crate) const WGL_BIND_TO_TEXTURE_RECTANGLE_RGB_NV: c_int = 0x20A0;
pub(crate) const WGL_BIND_TO_TEXTURE_RECTANGLE_RGBA_NV: c_int = 0x20A1;
pub(crate) const WGL_TEXTURE_RECTANGLE_NV: c_int = 0x20A2;
pub(crate) const WGL_FLOAT_COMPONENTS_NV: c_int = 0x20B0;

/// The WGL entry points that are not guaranteed to exist, declared
/// explicitly and resolved through `wglGetProcAddress` once per display.
#[allow(non_snake_case)]
#[derive(Default)]
pub(crate) struct WglExtra {
    pub(crate) GetExtensionsStringARB:
        Option<unsafe extern "system" fn(hdc: HDC) -> *const c_char>,
    pub(crate) GetExtensionsStringEXT: Option<unsafe extern "system" fn() -> *const c_char>,
    pub(crate) CreateContextAttribsARB: Option<
        unsafe extern "system" fn(hdc: HDC, share: HGLRC, attribs: *const c_int) -> HGLRC,
    >,
    pub(crate) ChoosePixelFormatARB: Option<
        unsafe extern "system" fn(
            hdc: HDC,
            attribs_i: *const c_int,
            attribs_f: *const f32,
            max_formats: u32,
            formats: *mut c_int,
            num_formats: *mut u32,
        ) -> i32,
    >,
    pub(crate) GetPixelFormatAttribivARB: Option<
        unsafe extern "system" fn(
            hdc: HDC,
            pixel_format: c_int,
            layer_plane: c_int,
            num_attributes: u32,
            attributes: *const c_int,
            values: *mut c_int,
        ) -> i32,
    >,
    pub(crate) CreatePbufferARB: Option<
        unsafe extern "system" fn(
            hdc: HDC,
            pixel_format: c_int,
            width: c_int,
            height: c_int,
            attribs: *const c_int,
        ) -> Pbuffer,
    >,
    pub(crate) GetPbufferDCARB: Option<unsafe extern "system" fn(pbuffer: Pbuffer) -> HDC>,
    pub(crate) ReleasePbufferDCARB:
        Option<unsafe extern "system" fn(pbuffer: Pbuffer, hdc: HDC) -> c_int>,
    pub(crate) DestroyPbufferARB: Option<unsafe extern "system" fn(pbuffer: Pbuffer) -> i32>,
    pub(crate) SwapIntervalEXT: Option<unsafe extern "system" fn(interval: c_int) -> i32>,
}

impl std::fmt::Debug for WglExtra {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WglExtra")
            .field("ChoosePixelFormatARB", &self.ChoosePixelFormatARB.is_some())
            .field("CreateContextAttribsARB", &self.CreateContextAttribsARB.is_some())
            .finish()
    }
}

/// A hidden window owning the device context the display uses for format
/// queries, pbuffer creation and extension loading. Kept alive for the
/// lifetime of the display so the driver the queries go to stays the same.
#[derive(Debug)]
pub(crate) struct HiddenWindow {
    pub(crate) hwnd: HWND,
    pub(crate) hdc: HDC,
}

unsafe impl Send for HiddenWindow {}
unsafe impl Sync for HiddenWindow {}

impl Drop for HiddenWindow {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
            DestroyWindow(self.hwnd);
        }
    }
}

pub(crate) fn wide_string(value: &str) -> Vec<u16> {
    std::ffi::OsStr::new(value).encode_wide().chain(Some(0)).collect()
}

/// Create the hidden window. A pixel format likely to hit the main video
/// driver is applied so the context created on it loads that driver's WGL
/// extensions.
pub(crate) unsafe fn create_hidden_window() -> Result<HiddenWindow> {
    let class_name = wide_string("glaze hidden window class");

    let mut class: WNDCLASSEXW = mem::zeroed();
    class.cbSize = mem::size_of::<WNDCLASSEXW>() as u32;
    class.style = CS_OWNDC;
    class.lpfnWndProc = Some(DefWindowProcW);
    class.hInstance = GetModuleHandleW(std::ptr::null());
    class.lpszClassName = class_name.as_ptr();

    // Re-registration of the same class fails; that's fine for multi-display
    // setups and ignored on purpose.
    RegisterClassExW(&class);

    let title = wide_string("glaze hidden window");
    let hwnd = CreateWindowExW(
        WS_EX_APPWINDOW,
        class_name.as_ptr(),
        title.as_ptr(),
        WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
        CW_USEDEFAULT,
        CW_USEDEFAULT,
        16,
        16,
        0,
        0,
        GetModuleHandleW(std::ptr::null()),
        std::ptr::null(),
    );
    if hwnd == 0 {
        return Err(IoError::last_os_error().into());
    }

    let hdc = GetDC(hwnd);
    if hdc == 0 {
        DestroyWindow(hwnd);
        return Err(ErrorKind::InitializationFailed.into());
    }

    let (format, descriptor) = config::choose_dummy_pixel_format(hdc)?;
    if gl::SetPixelFormat(hdc, format, &descriptor) == 0 {
        let err = IoError::last_os_error().into();
        ReleaseDC(hwnd, hdc);
        DestroyWindow(hwnd);
        return Err(err);
    }

    Ok(HiddenWindow { hwnd, hdc })
}

/// Load the WGL entry points that need a current context to resolve, plus
/// the client extension string.
pub(crate) unsafe fn load_extra_functions(window: &HiddenWindow) -> Result<(WglExtra, String)> {
    let context = wglCreateContext(window.hdc);
    if context == 0 {
        return Err(IoError::last_os_error().into());
    }

    let extra;
    let extensions;
    {
        let _guard = CurrentContextGuard::make_current(window.hdc, context)?;

        let load = |name: &str| -> Option<unsafe extern "system" fn() -> isize> {
            let name = CString::new(name).unwrap();
            unsafe { wglGetProcAddress(name.as_ptr().cast()) }
        };

        extra = WglExtra {
            GetExtensionsStringARB: load("wglGetExtensionsStringARB").map(|f| mem::transmute(f)),
            GetExtensionsStringEXT: load("wglGetExtensionsStringEXT").map(|f| mem::transmute(f)),
            CreateContextAttribsARB: load("wglCreateContextAttribsARB")
                .map(|f| mem::transmute(f)),
            ChoosePixelFormatARB: load("wglChoosePixelFormatARB").map(|f| mem::transmute(f)),
            GetPixelFormatAttribivARB: load("wglGetPixelFormatAttribivARB")
                .map(|f| mem::transmute(f)),
            CreatePbufferARB: load("wglCreatePbufferARB").map(|f| mem::transmute(f)),
            GetPbufferDCARB: load("wglGetPbufferDCARB").map(|f| mem::transmute(f)),
            ReleasePbufferDCARB: load("wglReleasePbufferDCARB").map(|f| mem::transmute(f)),
            DestroyPbufferARB: load("wglDestroyPbufferARB").map(|f| mem::transmute(f)),
            SwapIntervalEXT: load("wglSwapIntervalEXT").map(|f| mem::transmute(f)),
        };

        extensions = if let Some(get_extensions) = extra.GetExtensionsStringARB {
            cstr_to_string(get_extensions(window.hdc))
        } else if let Some(get_extensions) = extra.GetExtensionsStringEXT {
            cstr_to_string(get_extensions())
        } else {
            String::new()
        };
    }

    wglDeleteContext(context);
    Ok((extra, extensions))
}

pub(crate) unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Descriptor for the hidden window, matching what the main video driver is
/// most likely to provide.
pub(crate) fn dummy_descriptor() -> PIXELFORMATDESCRIPTOR {
    PIXELFORMATDESCRIPTOR {
        nSize: mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16,
        nVersion: 1,
        dwFlags: gl::PFD_DRAW_TO_WINDOW | gl::PFD_SUPPORT_OPENGL | gl::PFD_DOUBLEBUFFER,
        iPixelType: gl::PFD_TYPE_RGBA,
        cColorBits: 24,
        cRedBits: 0,
        cRedShift: 0,
        cGreenBits: 0,
        cGreenShift: 0,
        cBlueBits: 0,
        cBlueShift: 0,
        cAlphaBits: 8,
        cAlphaShift: 0,
        cAccumBits: 0,
        cAccumRedBits: 0,
        cAccumGreenBits: 0,
        cAccumBlueBits: 0,
        cAccumAlphaBits: 0,
        cDepthBits: 24,
        cStencilBits: 8,
        cAuxBuffers: 0,
        iLayerType: gl::PFD_MAIN_PLANE,
        bReserved: 0,
        dwLayerMask: 0,
        dwVisibleMask: 0,
        dwDamageMask: 0,
    }
}
