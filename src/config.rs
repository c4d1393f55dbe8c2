//! Capability requests and pixel format negotiation.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use raw_window_handle::RawWindowHandle;

use crate::api::{QueryPath, RawFormat};
use crate::chooser::CapabilitiesChooser;
use crate::display::Display;
use crate::error::{Error, ErrorKind, Result};

/// The smallest accumulated RGB depth treated as true color. Formats below it
/// are indexed/palette formats, which are not supported at all.
const MIN_TRUE_COLOR_BITS: u32 = 15;

bitflags! {
    /// The types of the surface supported by a configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SurfaceTypes: u8 {
        /// The configuration can back windows.
        const WINDOW  = 0b0000_0001;

        /// The configuration can back offscreen native bitmaps.
        const PIXMAP  = 0b0000_0010;

        /// The configuration can back pbuffers.
        const PBUFFER = 0b0000_0100;
    }
}

/// Builder for [`Capabilities`].
#[derive(Debug, Default, Clone)]
pub struct CapabilitiesBuilder {
    capabilities: Capabilities,
}

impl CapabilitiesBuilder {
    /// Create a new capabilities builder.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of bits per color channel in the color buffer.
    ///
    /// By default `8` is requested for every channel.
    #[inline]
    pub fn with_color_sizes(mut self, red: u8, green: u8, blue: u8) -> Self {
        self.capabilities.red_size = red;
        self.capabilities.green_size = green;
        self.capabilities.blue_size = blue;
        self
    }

    /// Number of alpha bits in the color buffer.
    ///
    /// By default `8` is requested.
    #[inline]
    pub fn with_alpha_size(mut self, alpha_size: u8) -> Self {
        self.capabilities.alpha_size = alpha_size;
        self
    }

    /// Number of bits in the depth buffer.
    ///
    /// By default `24` is requested.
    #[inline]
    pub fn with_depth_size(mut self, depth_size: u8) -> Self {
        self.capabilities.depth_size = depth_size;
        self
    }

    /// Number of bits in the stencil buffer.
    ///
    /// By default `8` is requested.
    #[inline]
    pub fn with_stencil_size(mut self, stencil_size: u8) -> Self {
        self.capabilities.stencil_size = stencil_size;
        self
    }

    /// Number of bits per channel in the accumulation buffer.
    ///
    /// By default `0` is requested.
    #[inline]
    pub fn with_accum_sizes(mut self, red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        self.capabilities.accum_red_size = red;
        self.capabilities.accum_green_size = green;
        self.capabilities.accum_blue_size = blue;
        self.capabilities.accum_alpha_size = alpha;
        self
    }

    /// Whether the color buffer is double buffered.
    ///
    /// By default `true` is requested.
    #[inline]
    pub fn with_double_buffer(mut self, double_buffer: bool) -> Self {
        self.capabilities.double_buffer = double_buffer;
        self
    }

    /// Whether stereo pairs should be present.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_stereo(mut self, stereo: bool) -> Self {
        self.capabilities.stereo = stereo;
        self
    }

    /// Whether multisampling configurations should be picked, and the amount
    /// of samples per pixel.
    ///
    /// By default multisampling is not specified.
    #[inline]
    pub fn with_multisampling(mut self, num_samples: u8) -> Self {
        self.capabilities.num_samples = Some(num_samples);
        self
    }

    /// Whether hardware accelerated formats should be preferred or avoided.
    ///
    /// By default acceleration or its absence is not requested.
    #[inline]
    pub fn prefer_hardware_accelerated(mut self, hardware_accelerated: Option<bool>) -> Self {
        self.capabilities.hardware_accelerated = hardware_accelerated;
        self
    }

    /// Whether floating point color buffers should be used.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_float_pixels(mut self, float_pixels: bool) -> Self {
        self.capabilities.float_pixels = float_pixels;
        self
    }

    /// The types of the surfaces that must be supported by the configuration.
    ///
    /// By default only the `WINDOW` bit is set.
    #[inline]
    pub fn with_surface_types(mut self, surface_types: SurfaceTypes) -> Self {
        self.capabilities.surface_types = surface_types;
        self
    }

    /// Whether a pbuffer backed by this configuration can be bound as a
    /// texture.
    ///
    /// By default `false` is requested.
    #[inline]
    pub fn with_render_to_texture(mut self, render_to_texture: bool) -> Self {
        self.capabilities.render_to_texture = render_to_texture;
        self
    }

    /// Whether a pbuffer backed by this configuration can be bound as a
    /// rectangle texture. Requires render-to-texture to be requested as well.
    #[inline]
    pub fn with_render_to_texture_rectangle(mut self, render_to_texture_rectangle: bool) -> Self {
        self.capabilities.render_to_texture_rectangle = render_to_texture_rectangle;
        self
    }

    /// Build the capabilities to negotiate with.
    #[must_use]
    pub fn build(self) -> Capabilities {
        self.capabilities
    }
}

/// A framebuffer capability set.
///
/// The same value type describes both sides of a negotiation: the *requested*
/// capabilities an application asks for, and the *chosen* capabilities the
/// platform actually produced, which are always taken from the platform's
/// enumerated formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub(crate) red_size: u8,
    pub(crate) green_size: u8,
    pub(crate) blue_size: u8,
    pub(crate) alpha_size: u8,

    pub(crate) depth_size: u8,
    pub(crate) stencil_size: u8,

    pub(crate) accum_red_size: u8,
    pub(crate) accum_green_size: u8,
    pub(crate) accum_blue_size: u8,
    pub(crate) accum_alpha_size: u8,

    pub(crate) double_buffer: bool,
    pub(crate) stereo: bool,

    /// The amount of samples per pixel, `None` when multisampling was not
    /// requested or the format has no sample buffers.
    pub(crate) num_samples: Option<u8>,

    pub(crate) hardware_accelerated: Option<bool>,
    pub(crate) float_pixels: bool,

    pub(crate) surface_types: SurfaceTypes,

    pub(crate) render_to_texture: bool,
    pub(crate) render_to_texture_rectangle: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            red_size: 8,
            green_size: 8,
            blue_size: 8,
            alpha_size: 8,

            depth_size: 24,
            stencil_size: 8,

            accum_red_size: 0,
            accum_green_size: 0,
            accum_blue_size: 0,
            accum_alpha_size: 0,

            double_buffer: true,
            stereo: false,

            num_samples: None,

            hardware_accelerated: None,
            float_pixels: false,

            surface_types: SurfaceTypes::WINDOW,

            render_to_texture: false,
            render_to_texture_rectangle: false,
        }
    }
}

impl Capabilities {
    /// The size of the red channel in bits.
    #[inline]
    pub fn red_size(&self) -> u8 {
        self.red_size
    }

    /// The size of the green channel in bits.
    #[inline]
    pub fn green_size(&self) -> u8 {
        self.green_size
    }

    /// The size of the blue channel in bits.
    #[inline]
    pub fn blue_size(&self) -> u8 {
        self.blue_size
    }

    /// The size of the alpha channel in bits.
    #[inline]
    pub fn alpha_size(&self) -> u8 {
        self.alpha_size
    }

    /// The size of the depth buffer in bits.
    #[inline]
    pub fn depth_size(&self) -> u8 {
        self.depth_size
    }

    /// The size of the stencil buffer in bits.
    #[inline]
    pub fn stencil_size(&self) -> u8 {
        self.stencil_size
    }

    /// The per channel sizes of the accumulation buffer in bits.
    #[inline]
    pub fn accum_sizes(&self) -> (u8, u8, u8, u8) {
        (self.accum_red_size, self.accum_green_size, self.accum_blue_size, self.accum_alpha_size)
    }

    /// Whether the color buffer is double buffered.
    #[inline]
    pub fn double_buffer(&self) -> bool {
        self.double_buffer
    }

    /// Whether the format provides stereo pairs.
    #[inline]
    pub fn stereo(&self) -> bool {
        self.stereo
    }

    /// The number of samples in the multisample buffer, if any.
    #[inline]
    pub fn num_samples(&self) -> Option<u8> {
        self.num_samples
    }

    /// Whether the format is hardware accelerated. `None` when not requested
    /// or not identifiable.
    #[inline]
    pub fn hardware_accelerated(&self) -> Option<bool> {
        self.hardware_accelerated
    }

    /// Whether the format uses floating point color components.
    #[inline]
    pub fn float_pixels(&self) -> bool {
        self.float_pixels
    }

    /// The surface types the format can back.
    #[inline]
    pub fn surface_types(&self) -> SurfaceTypes {
        self.surface_types
    }

    /// Whether a pbuffer with this format can be bound as a texture.
    #[inline]
    pub fn render_to_texture(&self) -> bool {
        self.render_to_texture
    }

    /// Whether a pbuffer with this format can be bound as a rectangle
    /// texture.
    #[inline]
    pub fn render_to_texture_rectangle(&self) -> bool {
        self.render_to_texture_rectangle
    }

    /// Check the request for combinations no platform can satisfy. Performed
    /// before any native call, so a bad request never reaches the driver.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.render_to_texture_rectangle && !self.render_to_texture {
            return Err(ErrorKind::BadCapabilities(
                "render-to-texture-rectangle requires render-to-texture",
            )
            .into());
        }

        let color_bits = self.red_size as u32 + self.green_size as u32 + self.blue_size as u32;
        if color_bits < MIN_TRUE_COLOR_BITS {
            return Err(ErrorKind::BadCapabilities(
                "indexed and palette color formats are not supported",
            )
            .into());
        }

        Ok(())
    }
}

impl Display {
    /// Negotiate a configuration for an onscreen window surface.
    ///
    /// When the native window already carries a pixel format assigned by an
    /// external layer, that format is described and accepted unconditionally
    /// without consulting the `chooser`. Otherwise the available formats are
    /// enumerated, through the platform's extended query when it's present
    /// and needed, and the `chooser` picks one from the candidate list.
    ///
    /// An index outside of the candidate list returned by the `chooser` is a
    /// fatal [`ErrorKind::BadChooserIndex`] error, never a silent fallback.
    pub fn choose_config(
        &self,
        requested: &Capabilities,
        chooser: &dyn CapabilitiesChooser,
        window: Option<RawWindowHandle>,
    ) -> Result<Config> {
        requested.validate()?;
        let driver = self.driver();

        // Somebody else already configured this surface; describe and accept.
        if let Some(window) = window {
            if let Some(format) = driver.surface_format(window)? {
                let capabilities = driver.describe_format(Some(window), format)?;
                log::debug!("accepting externally assigned pixel format {format:?}");
                return Ok(Config::new(self.clone(), format, capabilities));
            }
        }

        // The extended query is only worth the round trips when the request
        // can't be expressed through the legacy descriptor.
        let path = if driver.supports_extended_query()
            && (requested.num_samples.is_some() || requested.float_pixels)
        {
            QueryPath::Extended
        } else if requested.float_pixels {
            return Err(ErrorKind::NotSupported(
                "float pixel formats require the extended pixel format query",
            )
            .into());
        } else {
            QueryPath::Legacy
        };

        let recommended = driver.recommended_format(window, requested, path)?;
        let candidates = driver.enumerate_formats(window, path)?;
        if candidates.is_empty() {
            return Err(ErrorKind::NoAvailablePixelFormat.into());
        }

        let recommended_index =
            recommended.and_then(|format| candidates.iter().position(|(id, _)| *id == format));

        let available: Vec<Capabilities> =
            candidates.iter().map(|(_, capabilities)| capabilities.clone()).collect();
        let chosen = chooser.choose(requested, &available, recommended_index);
        if chosen >= available.len() {
            return Err(Error::new(
                None,
                Some(format!(
                    "chooser returned {chosen}, but only {} formats are available",
                    available.len()
                )),
                ErrorKind::BadChooserIndex,
            ));
        }

        let format = candidates[chosen].0;
        // Re-resolve instead of trusting the enumerated summary, the chosen
        // capabilities must come from the native descriptor itself.
        let capabilities = driver.describe_format(window, format)?;
        log::debug!("chose pixel format {format:?} at index {chosen} via {path:?} query");

        Ok(Config::new(self.clone(), format, capabilities))
    }

    /// Negotiate a configuration for an offscreen native bitmap surface.
    ///
    /// No chooser is consulted; the format is the platform's nearest legacy
    /// match for the request.
    pub fn choose_pixmap_config(&self, requested: &Capabilities) -> Result<Config> {
        requested.validate()?;
        let driver = self.driver();

        let format = driver
            .recommended_format(None, requested, QueryPath::Legacy)?
            .ok_or(ErrorKind::NoAvailablePixelFormat)?;
        let mut capabilities = driver.describe_format(None, format)?;
        capabilities.double_buffer = false;
        capabilities.surface_types = SurfaceTypes::PIXMAP;

        Ok(Config::new(self.clone(), format, capabilities))
    }

    /// Negotiate a configuration for a pbuffer surface.
    ///
    /// Pbuffers only exist behind the extended pixel format query; its
    /// absence is fatal rather than a fallback to the legacy path.
    pub fn choose_pbuffer_config(&self, requested: &Capabilities) -> Result<Config> {
        requested.validate()?;
        let driver = self.driver();

        if !driver.supports_extended_query() {
            return Err(ErrorKind::NotSupported("pbuffer support is not available").into());
        }

        let (format, capabilities) = driver.choose_pbuffer_format(requested)?;
        log::debug!("chose pbuffer pixel format {format:?}");
        Ok(Config::new(self.clone(), format, capabilities))
    }
}

/// A negotiated configuration used to create [`Surface`]s and [`Context`]s.
///
/// The chosen [`Capabilities`] are resolved from the native descriptor once,
/// when the config is negotiated, and are never recomputed for the lifetime
/// of the surfaces created from it.
///
/// [`Surface`]: crate::surface::Surface
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) inner: Arc<ConfigInner>,
}

impl Config {
    pub(crate) fn new(display: Display, format: RawFormat, capabilities: Capabilities) -> Self {
        Config { inner: Arc::new(ConfigInner { display, format, capabilities }) }
    }

    /// The display the configuration was negotiated against.
    #[inline]
    pub fn display(&self) -> &Display {
        &self.inner.display
    }

    /// The capabilities the platform actually produced.
    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// The native pixel format id backing this configuration.
    #[inline]
    pub fn raw_format(&self) -> i64 {
        self.inner.format.0
    }

    pub(crate) fn format(&self) -> RawFormat {
        self.inner.format
    }
}

pub(crate) struct ConfigInner {
    pub(crate) display: Display,
    pub(crate) format: RawFormat,
    pub(crate) capabilities: Capabilities,
}

impl PartialEq for ConfigInner {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format
    }
}

impl Eq for ConfigInner {}

impl fmt::Debug for ConfigInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("format", &self.format)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_textures_require_render_to_texture() {
        let capabilities = CapabilitiesBuilder::new()
            .with_surface_types(SurfaceTypes::PBUFFER)
            .with_render_to_texture_rectangle(true)
            .build();

        let err = capabilities.validate().unwrap_err();
        assert!(matches!(err.error_kind(), ErrorKind::BadCapabilities(_)));
    }

    #[test]
    fn indexed_color_is_rejected() {
        let capabilities = CapabilitiesBuilder::new().with_color_sizes(4, 4, 4).build();
        let err = capabilities.validate().unwrap_err();
        assert!(matches!(err.error_kind(), ErrorKind::BadCapabilities(_)));

        // 5/5/5 is the smallest surviving true color layout.
        let capabilities = CapabilitiesBuilder::new().with_color_sizes(5, 5, 5).build();
        assert!(capabilities.validate().is_ok());
    }
}
