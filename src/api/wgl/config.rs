//! Handling of PIXELFORMATDESCRIPTOR and pixel format queries.

use std::io::Error as IoError;
use std::mem::{self, MaybeUninit};
use std::os::raw::c_int;

use raw_window_handle::RawWindowHandle;
use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HDC};
use windows_sys::Win32::Graphics::OpenGL::{self as gl, PIXELFORMATDESCRIPTOR};

use super::display::Display;
use super::*;
use crate::api::{QueryPath, RawFormat};
use crate::config::{Capabilities, SurfaceTypes};
use crate::error::{ErrorKind, Result};

/// A device context acquired for one query, released on drop when it was
/// taken from a window rather than borrowed from the hidden window.
pub(super) struct DcGuard {
    hwnd: HWND,
    hdc: HDC,
    owned: bool,
}

impl DcGuard {
    pub(super) fn hdc(&self) -> HDC {
        self.hdc
    }
}

impl Drop for DcGuard {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                ReleaseDC(self.hwnd, self.hdc);
            }
        }
    }
}

impl Display {
    /// The device context to run a query against: the window's when one was
    /// passed, the hidden window's otherwise.
    pub(super) fn query_dc(&self, window: Option<RawWindowHandle>) -> Result<DcGuard> {
        match window {
            Some(RawWindowHandle::Win32(window)) => {
                let hwnd = window.hwnd.get();
                let hdc = unsafe { GetDC(hwnd) };
                if hdc == 0 {
                    return Err(ErrorKind::BadNativeWindow.into());
                }
                Ok(DcGuard { hwnd, hdc, owned: true })
            },
            Some(_) => Err(ErrorKind::BadNativeWindow.into()),
            None => Ok(DcGuard { hwnd: self.hidden.hwnd, hdc: self.hidden.hdc, owned: false }),
        }
    }

    pub(super) fn surface_format(&self, window: RawWindowHandle) -> Result<Option<RawFormat>> {
        let dc = self.query_dc(Some(window))?;
        match unsafe { gl::GetPixelFormat(dc.hdc()) } {
            0 => Ok(None),
            format => Ok(Some(RawFormat(format as i64))),
        }
    }

    pub(super) fn recommended_format(
        &self,
        window: Option<RawWindowHandle>,
        requested: &Capabilities,
        path: QueryPath,
    ) -> Result<Option<RawFormat>> {
        let dc = self.query_dc(window)?;

        match path {
            QueryPath::Legacy => {
                let descriptor = descriptor_from_capabilities(requested);
                match unsafe { gl::ChoosePixelFormat(dc.hdc(), &descriptor) } {
                    0 => Ok(None),
                    format => Ok(Some(RawFormat(format as i64))),
                }
            },
            QueryPath::Extended => {
                let choose = self
                    .wgl_extra
                    .ChoosePixelFormatARB
                    .ok_or(ErrorKind::NotSupported("WGL_ARB_pixel_format is not present"))?;

                let attrs = self.arb_attributes(requested)?;
                let mut format: c_int = 0;
                let mut num_formats: u32 = 0;
                unsafe {
                    if choose(
                        dc.hdc(),
                        attrs.as_ptr(),
                        std::ptr::null(),
                        1,
                        &mut format,
                        &mut num_formats,
                    ) == 0
                    {
                        return Err(IoError::last_os_error().into());
                    }
                }

                Ok((num_formats > 0).then_some(RawFormat(format as i64)))
            },
        }
    }

    pub(super) fn enumerate_formats(
        &self,
        window: Option<RawWindowHandle>,
        path: QueryPath,
    ) -> Result<Vec<(RawFormat, Capabilities)>> {
        let dc = self.query_dc(window)?;

        match path {
            QueryPath::Legacy => self.enumerate_legacy(dc.hdc()),
            QueryPath::Extended => self.enumerate_arb(dc.hdc()),
        }
    }

    fn enumerate_legacy(&self, hdc: HDC) -> Result<Vec<(RawFormat, Capabilities)>> {
        let size = mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32;

        // DescribePixelFormat reports the number of formats regardless of
        // the index queried.
        let count = unsafe {
            let mut descriptor = MaybeUninit::<PIXELFORMATDESCRIPTOR>::uninit();
            gl::DescribePixelFormat(hdc, 1, size, descriptor.as_mut_ptr())
        };
        if count == 0 {
            return Err(IoError::last_os_error().into());
        }

        let mut formats = Vec::new();
        for index in 1..=count {
            let descriptor = unsafe {
                let mut descriptor = MaybeUninit::<PIXELFORMATDESCRIPTOR>::uninit();
                if gl::DescribePixelFormat(hdc, index, size, descriptor.as_mut_ptr()) == 0 {
                    continue;
                }
                descriptor.assume_init()
            };

            // Indexed color and non-GL formats never become candidates.
            if descriptor.iPixelType != gl::PFD_TYPE_RGBA
                || descriptor.dwFlags & gl::PFD_SUPPORT_OPENGL == 0
            {
                continue;
            }

            formats.push((RawFormat(index as i64), capabilities_from_descriptor(&descriptor)));
        }

        Ok(formats)
    }

    fn enumerate_arb(&self, hdc: HDC) -> Result<Vec<(RawFormat, Capabilities)>> {
        let count = self.arb_attribute(hdc, 1, WGL_NUMBER_PIXEL_FORMATS_ARB)?;

        let mut formats = Vec::new();
        for index in 1..=count {
            if self.arb_attribute(hdc, index, WGL_SUPPORT_OPENGL_ARB)? == 0 {
                continue;
            }

            let pixel_type = self.arb_attribute(hdc, index, WGL_PIXEL_TYPE_ARB)?;
            let float_pixels = pixel_type == WGL_TYPE_RGBA_FLOAT_ARB
                || self
                    .has_client_extension("WGL_NV_float_buffer")
                    .then(|| self.arb_attribute(hdc, index, WGL_FLOAT_COMPONENTS_NV))
                    .transpose()?
                    .map_or(false, |value| value != 0);
            if pixel_type != WGL_TYPE_RGBA_ARB && pixel_type != WGL_TYPE_RGBA_FLOAT_ARB {
                continue;
            }

            formats.push((
                RawFormat(index as i64),
                self.arb_capabilities(hdc, index, float_pixels)?,
            ));
        }

        Ok(formats)
    }

    pub(super) fn describe_format(
        &self,
        window: Option<RawWindowHandle>,
        format: RawFormat,
    ) -> Result<Capabilities> {
        let dc = self.query_dc(window)?;
        let index = format.0 as c_int;

        if self.supports_arb_queries() {
            let pixel_type = self.arb_attribute(dc.hdc(), index, WGL_PIXEL_TYPE_ARB)?;
            self.arb_capabilities(dc.hdc(), index, pixel_type == WGL_TYPE_RGBA_FLOAT_ARB)
        } else {
            let descriptor = unsafe {
                let mut descriptor = MaybeUninit::<PIXELFORMATDESCRIPTOR>::uninit();
                if gl::DescribePixelFormat(
                    dc.hdc(),
                    index,
                    mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32,
                    descriptor.as_mut_ptr(),
                ) == 0
                {
                    return Err(IoError::last_os_error().into());
                }
                descriptor.assume_init()
            };
            Ok(capabilities_from_descriptor(&descriptor))
        }
    }

    pub(super) fn choose_pbuffer_format(
        &self,
        requested: &Capabilities,
    ) -> Result<(RawFormat, Capabilities)> {
        if !self.has_client_extension("WGL_ARB_pbuffer") {
            return Err(ErrorKind::NotSupported("pbuffer support is not available").into());
        }
        let choose = self
            .wgl_extra
            .ChoosePixelFormatARB
            .ok_or(ErrorKind::NotSupported("pbuffer support is not available"))?;

        let mut attrs = self.arb_attributes(requested)?;
        // Drop the trailing terminator to splice in the pbuffer attributes.
        attrs.pop();

        attrs.push(WGL_DRAW_TO_PBUFFER_ARB);
        attrs.push(1);

        if requested.render_to_texture() {
            attrs.push(WGL_BIND_TO_TEXTURE_RGBA_ARB);
            attrs.push(1);
        }
        if requested.render_to_texture_rectangle() {
            if !self.has_client_extension("WGL_NV_render_texture_rectangle") {
                return Err(ErrorKind::NotSupported(
                    "render to texture rectangle is not available",
                )
                .into());
            }
            attrs.push(WGL_BIND_TO_TEXTURE_RECTANGLE_RGBA_NV);
            attrs.push(1);
        }

        attrs.push(0);

        let mut format: c_int = 0;
        let mut num_formats: u32 = 0;
        unsafe {
            if choose(
                self.hidden.hdc,
                attrs.as_ptr(),
                std::ptr::null(),
                1,
                &mut format,
                &mut num_formats,
            ) == 0
            {
                return Err(IoError::last_os_error().into());
            }
        }
        if num_formats == 0 {
            return Err(ErrorKind::NoAvailablePixelFormat.into());
        }

        let mut capabilities = self.arb_capabilities(
            self.hidden.hdc,
            format,
            requested.float_pixels(),
        )?;
        capabilities.surface_types |= SurfaceTypes::PBUFFER;
        capabilities.render_to_texture = requested.render_to_texture();
        capabilities.render_to_texture_rectangle = requested.render_to_texture_rectangle();

        Ok((RawFormat(format as i64), capabilities))
    }

    fn supports_arb_queries(&self) -> bool {
        self.wgl_extra.GetPixelFormatAttribivARB.is_some()
            && self.has_client_extension("WGL_ARB_pixel_format")
    }

    /// Query one attribute of one pixel format.
    pub(super) fn arb_attribute(&self, hdc: HDC, format: c_int, attr: c_int) -> Result<c_int> {
        let query = self
            .wgl_extra
            .GetPixelFormatAttribivARB
            .ok_or(ErrorKind::NotSupported("WGL_ARB_pixel_format is not present"))?;

        let mut value = 0;
        unsafe {
            if query(hdc, format, gl::PFD_MAIN_PLANE as c_int, 1, &attr, &mut value) == 0 {
                return Err(IoError::last_os_error().into());
            }
        }
        Ok(value)
    }

    fn arb_capabilities(
        &self,
        hdc: HDC,
        format: c_int,
        float_pixels: bool,
    ) -> Result<Capabilities> {
        let attr = |attr| self.arb_attribute(hdc, format, attr);

        let mut surface_types = SurfaceTypes::empty();
        if attr(WGL_DRAW_TO_WINDOW_ARB)? != 0 {
            surface_types |= SurfaceTypes::WINDOW;
        }
        if attr(WGL_DRAW_TO_BITMAP_ARB)? != 0 {
            surface_types |= SurfaceTypes::PIXMAP;
        }
        if attr(WGL_DRAW_TO_PBUFFER_ARB)? != 0 {
            surface_types |= SurfaceTypes::PBUFFER;
        }

        let multisample = self.has_client_extension("WGL_ARB_multisample")
            && attr(WGL_SAMPLE_BUFFERS_ARB)? != 0;

        let render_to_texture = self.has_client_extension("WGL_ARB_render_texture")
            && (attr(WGL_BIND_TO_TEXTURE_RGB_ARB)? != 0
                || attr(WGL_BIND_TO_TEXTURE_RGBA_ARB)? != 0);
        let render_to_texture_rectangle = self
            .has_client_extension("WGL_NV_render_texture_rectangle")
            && (attr(WGL_BIND_TO_TEXTURE_RECTANGLE_RGB_NV)? != 0
                || attr(WGL_BIND_TO_TEXTURE_RECTANGLE_RGBA_NV)? != 0);

        Ok(Capabilities {
            red_size: attr(WGL_RED_BITS_ARB)? as u8,
            green_size: attr(WGL_GREEN_BITS_ARB)? as u8,
            blue_size: attr(WGL_BLUE_BITS_ARB)? as u8,
            alpha_size: attr(WGL_ALPHA_BITS_ARB)? as u8,
            depth_size: attr(WGL_DEPTH_BITS_ARB)? as u8,
            stencil_size: attr(WGL_STENCIL_BITS_ARB)? as u8,
            accum_red_size: attr(WGL_ACCUM_RED_BITS_ARB)? as u8,
            accum_green_size: attr(WGL_ACCUM_GREEN_BITS_ARB)? as u8,
            accum_blue_size: attr(WGL_ACCUM_BLUE_BITS_ARB)? as u8,
            accum_alpha_size: attr(WGL_ACCUM_ALPHA_BITS_ARB)? as u8,
            double_buffer: attr(WGL_DOUBLE_BUFFER_ARB)? != 0,
            stereo: attr(WGL_STEREO_ARB)? != 0,
            num_samples: multisample.then(|| attr(WGL_SAMPLES_ARB)).transpose()?.map(|s| s as u8),
            hardware_accelerated: Some(attr(WGL_ACCELERATION_ARB)? != WGL_NO_ACCELERATION_ARB),
            float_pixels,
            surface_types,
            render_to_texture,
            render_to_texture_rectangle,
        })
    }

    /// Translate the request into a WGL_ARB_pixel_format attribute list.
    fn arb_attributes(&self, requested: &Capabilities) -> Result<Vec<c_int>> {
        let mut attrs = Vec::<c_int>::with_capacity(40);
        let mut push = |attr: c_int, value: c_int| {
            attrs.push(attr);
            attrs.push(value);
        };

        push(WGL_SUPPORT_OPENGL_ARB, 1);

        push(WGL_RED_BITS_ARB, requested.red_size() as c_int);
        push(WGL_GREEN_BITS_ARB, requested.green_size() as c_int);
        push(WGL_BLUE_BITS_ARB, requested.blue_size() as c_int);
        push(WGL_ALPHA_BITS_ARB, requested.alpha_size() as c_int);
        push(WGL_DEPTH_BITS_ARB, requested.depth_size() as c_int);
        push(WGL_STENCIL_BITS_ARB, requested.stencil_size() as c_int);

        let (accum_red, accum_green, accum_blue, accum_alpha) = requested.accum_sizes();
        if accum_red | accum_green | accum_blue | accum_alpha != 0 {
            push(WGL_ACCUM_RED_BITS_ARB, accum_red as c_int);
            push(WGL_ACCUM_GREEN_BITS_ARB, accum_green as c_int);
            push(WGL_ACCUM_BLUE_BITS_ARB, accum_blue as c_int);
            push(WGL_ACCUM_ALPHA_BITS_ARB, accum_alpha as c_int);
        }

        push(WGL_DOUBLE_BUFFER_ARB, requested.double_buffer() as c_int);
        push(WGL_STEREO_ARB, requested.stereo() as c_int);

        // The ARB float format is preferred; NV float buffers are only used
        // when it's absent.
        if requested.float_pixels() {
            if self.has_client_extension("WGL_ARB_pixel_format_float") {
                push(WGL_PIXEL_TYPE_ARB, WGL_TYPE_RGBA_FLOAT_ARB);
            } else if self.has_client_extension("WGL_NV_float_buffer") {
                push(WGL_PIXEL_TYPE_ARB, WGL_TYPE_RGBA_ARB);
                push(WGL_FLOAT_COMPONENTS_NV, 1);
            } else {
                return Err(
                    ErrorKind::NotSupported("float pixel formats are not supported").into()
                );
            }
        } else {
            push(WGL_PIXEL_TYPE_ARB, WGL_TYPE_RGBA_ARB);
        }

        if let Some(samples) = requested.num_samples() {
            if self.has_client_extension("WGL_ARB_multisample") {
                push(WGL_SAMPLE_BUFFERS_ARB, 1);
                push(WGL_SAMPLES_ARB, samples as c_int);
            }
        }

        if let Some(accelerated) = requested.hardware_accelerated() {
            push(
                WGL_ACCELERATION_ARB,
                if accelerated { WGL_FULL_ACCELERATION_ARB } else { WGL_NO_ACCELERATION_ARB },
            );
        }

        if requested.surface_types().contains(SurfaceTypes::WINDOW) {
            push(WGL_DRAW_TO_WINDOW_ARB, 1);
        }
        if requested.surface_types().contains(SurfaceTypes::PIXMAP) {
            push(WGL_DRAW_TO_BITMAP_ARB, 1);
        }

        attrs.push(0);
        Ok(attrs)
    }
}

/// Translate the request into a legacy descriptor.
pub(super) fn descriptor_from_capabilities(requested: &Capabilities) -> PIXELFORMATDESCRIPTOR {
    let mut dw_flags = gl::PFD_SUPPORT_OPENGL;
    if requested.double_buffer() {
        dw_flags |= gl::PFD_DOUBLEBUFFER;
    }
    if requested.stereo() {
        dw_flags |= gl::PFD_STEREO;
    }
    if requested.surface_types().contains(SurfaceTypes::WINDOW) {
        dw_flags |= gl::PFD_DRAW_TO_WINDOW;
    }
    if requested.surface_types().contains(SurfaceTypes::PIXMAP) {
        dw_flags |= gl::PFD_DRAW_TO_BITMAP;
    }

    let (accum_red, accum_green, accum_blue, accum_alpha) = requested.accum_sizes();

    PIXELFORMATDESCRIPTOR {
        nSize: mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16,
        // Should be one according to the docs.
        nVersion: 1,
        dwFlags: dw_flags,
        iPixelType: gl::PFD_TYPE_RGBA,
        cColorBits: requested.red_size() + requested.green_size() + requested.blue_size(),
        cRedBits: requested.red_size(),
        cRedShift: 0,
        cGreenBits: requested.green_size(),
        cGreenShift: 0,
        cBlueBits: requested.blue_size(),
        cBlueShift: 0,
        cAlphaBits: requested.alpha_size(),
        cAlphaShift: 0,
        cAccumBits: accum_red + accum_green + accum_blue + accum_alpha,
        cAccumRedBits: accum_red,
        cAccumGreenBits: accum_green,
        cAccumBlueBits: accum_blue,
        cAccumAlphaBits: accum_alpha,
        cDepthBits: requested.depth_size(),
        cStencilBits: requested.stencil_size(),
        cAuxBuffers: 0,
        iLayerType: gl::PFD_MAIN_PLANE,
        bReserved: 0,
        dwLayerMask: 0,
        dwVisibleMask: 0,
        dwDamageMask: 0,
    }
}

/// The coarse capability view of a legacy descriptor.
pub(super) fn capabilities_from_descriptor(descriptor: &PIXELFORMATDESCRIPTOR) -> Capabilities {
    let mut surface_types = SurfaceTypes::empty();
    if descriptor.dwFlags & gl::PFD_DRAW_TO_WINDOW != 0 {
        surface_types |= SurfaceTypes::WINDOW;
    }
    if descriptor.dwFlags & gl::PFD_DRAW_TO_BITMAP != 0 {
        surface_types |= SurfaceTypes::PIXMAP;
    }

    Capabilities {
        red_size: descriptor.cRedBits,
        green_size: descriptor.cGreenBits,
        blue_size: descriptor.cBlueBits,
        alpha_size: descriptor.cAlphaBits,
        depth_size: descriptor.cDepthBits,
        stencil_size: descriptor.cStencilBits,
        accum_red_size: descriptor.cAccumRedBits,
        accum_green_size: descriptor.cAccumGreenBits,
        accum_blue_size: descriptor.cAccumBlueBits,
        accum_alpha_size: descriptor.cAccumAlphaBits,
        double_buffer: descriptor.dwFlags & gl::PFD_DOUBLEBUFFER != 0,
        stereo: descriptor.dwFlags & gl::PFD_STEREO != 0,
        num_samples: None,
        hardware_accelerated: Some(descriptor.dwFlags & gl::PFD_GENERIC_FORMAT == 0),
        float_pixels: false,
        surface_types,
        render_to_texture: false,
        render_to_texture_rectangle: false,
    }
}

/// This function chooses a pixel format that is likely to be provided by the
/// main video driver of the system.
pub(super) fn choose_dummy_pixel_format(hdc: HDC) -> Result<(c_int, PIXELFORMATDESCRIPTOR)> {
    let descriptor = super::dummy_descriptor();

    let format = unsafe { gl::ChoosePixelFormat(hdc, &descriptor) };
    if format == 0 {
        return Err(IoError::last_os_error().into());
    }

    unsafe {
        let mut chosen = MaybeUninit::<PIXELFORMATDESCRIPTOR>::uninit();
        if gl::DescribePixelFormat(
            hdc,
            format,
            mem::size_of::<PIXELFORMATDESCRIPTOR>() as u32,
            chosen.as_mut_ptr(),
        ) == 0
        {
            return Err(IoError::last_os_error().into());
        }

        let chosen = chosen.assume_init();
        if chosen.iPixelType != gl::PFD_TYPE_RGBA {
            return Err(ErrorKind::NoAvailablePixelFormat.into());
        }

        Ok((format, chosen))
    }
}
