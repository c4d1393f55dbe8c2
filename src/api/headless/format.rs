//! The software descriptor format and its capability conversions.

use crate::api::QueryPath;
use crate::config::{Capabilities, SurfaceTypes};

/// The native descriptor of one software pixel format.
///
/// This is the headless analog of a platform descriptor struct: the full
/// truth about a format, of which the legacy query path only sees a coarse
/// projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,

    pub depth_bits: u8,
    pub stencil_bits: u8,

    pub accum_red_bits: u8,
    pub accum_green_bits: u8,
    pub accum_blue_bits: u8,
    pub accum_alpha_bits: u8,

    pub double_buffer: bool,
    pub stereo: bool,

    pub sample_buffers: bool,
    pub samples: u8,

    pub draw_to_window: bool,
    pub draw_to_bitmap: bool,
    pub draw_to_pbuffer: bool,

    pub bind_to_texture: bool,
    pub bind_to_texture_rectangle: bool,

    pub float_components: bool,
    /// The format's float components are only reachable through the NV
    /// extension, not the ARB one.
    pub nv_float: bool,

    pub accelerated: bool,
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        FormatDescriptor {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 24,
            stencil_bits: 8,
            accum_red_bits: 0,
            accum_green_bits: 0,
            accum_blue_bits: 0,
            accum_alpha_bits: 0,
            double_buffer: true,
            stereo: false,
            sample_buffers: false,
            samples: 0,
            draw_to_window: true,
            draw_to_bitmap: false,
            draw_to_pbuffer: false,
            bind_to_texture: false,
            bind_to_texture_rectangle: false,
            float_components: false,
            nv_float: false,
            accelerated: false,
        }
    }
}

impl FormatDescriptor {
    /// The capabilities the given query path can see in this descriptor.
    ///
    /// The legacy path is deliberately coarse: it reports no multisampling
    /// and cannot tell pbuffer capable formats apart from window-only ones.
    pub(crate) fn to_capabilities(&self, path: QueryPath) -> Capabilities {
        let mut surface_types = SurfaceTypes::empty();
        if self.draw_to_window {
            surface_types |= SurfaceTypes::WINDOW;
        }
        if self.draw_to_bitmap {
            surface_types |= SurfaceTypes::PIXMAP;
        }

        let mut capabilities = Capabilities {
            red_size: self.red_bits,
            green_size: self.green_bits,
            blue_size: self.blue_bits,
            alpha_size: self.alpha_bits,
            depth_size: self.depth_bits,
            stencil_size: self.stencil_bits,
            accum_red_size: self.accum_red_bits,
            accum_green_size: self.accum_green_bits,
            accum_blue_size: self.accum_blue_bits,
            accum_alpha_size: self.accum_alpha_bits,
            double_buffer: self.double_buffer,
            stereo: self.stereo,
            num_samples: None,
            hardware_accelerated: Some(self.accelerated),
            float_pixels: false,
            surface_types,
            render_to_texture: false,
            render_to_texture_rectangle: false,
        };

        if path == QueryPath::Extended {
            if self.sample_buffers {
                capabilities.num_samples = Some(self.samples);
            }
            if self.draw_to_pbuffer {
                capabilities.surface_types |= SurfaceTypes::PBUFFER;
            }
            capabilities.float_pixels = self.float_components;
            capabilities.render_to_texture = self.bind_to_texture;
            capabilities.render_to_texture_rectangle = self.bind_to_texture_rectangle;
        }

        capabilities
    }

    /// Encode a capability set as a descriptor. Fields the descriptor cannot
    /// represent (acceleration preference) are dropped.
    pub(crate) fn from_capabilities(capabilities: &Capabilities) -> Self {
        FormatDescriptor {
            red_bits: capabilities.red_size,
            green_bits: capabilities.green_size,
            blue_bits: capabilities.blue_size,
            alpha_bits: capabilities.alpha_size,
            depth_bits: capabilities.depth_size,
            stencil_bits: capabilities.stencil_size,
            accum_red_bits: capabilities.accum_red_size,
            accum_green_bits: capabilities.accum_green_size,
            accum_blue_bits: capabilities.accum_blue_size,
            accum_alpha_bits: capabilities.accum_alpha_size,
            double_buffer: capabilities.double_buffer,
            stereo: capabilities.stereo,
            sample_buffers: capabilities.num_samples.is_some(),
            samples: capabilities.num_samples.unwrap_or(0),
            draw_to_window: capabilities.surface_types.contains(SurfaceTypes::WINDOW),
            draw_to_bitmap: capabilities.surface_types.contains(SurfaceTypes::PIXMAP),
            draw_to_pbuffer: capabilities.surface_types.contains(SurfaceTypes::PBUFFER),
            bind_to_texture: capabilities.render_to_texture,
            bind_to_texture_rectangle: capabilities.render_to_texture_rectangle,
            float_components: capabilities.float_pixels,
            nv_float: false,
            accelerated: capabilities.hardware_accelerated.unwrap_or(false),
        }
    }
}

/// The default format table: a plausible software rasterizer selection of
/// window, multisample and pbuffer formats.
pub(crate) fn default_formats() -> Vec<FormatDescriptor> {
    let base = FormatDescriptor {
        draw_to_window: true,
        draw_to_bitmap: true,
        draw_to_pbuffer: true,
        bind_to_texture: true,
        bind_to_texture_rectangle: true,
        ..Default::default()
    };

    let mut formats = vec![
        // Plain true color, double and single buffered.
        base.clone(),
        FormatDescriptor { double_buffer: false, ..base.clone() },
        // Shallow depth, no stencil.
        FormatDescriptor { depth_bits: 16, stencil_bits: 0, ..base.clone() },
        // Multisampled variants.
        FormatDescriptor { sample_buffers: true, samples: 2, ..base.clone() },
        FormatDescriptor { sample_buffers: true, samples: 4, ..base.clone() },
        FormatDescriptor { sample_buffers: true, samples: 8, ..base.clone() },
        // Accumulation buffer variant.
        FormatDescriptor {
            accum_red_bits: 16,
            accum_green_bits: 16,
            accum_blue_bits: 16,
            accum_alpha_bits: 16,
            ..base.clone()
        },
        // Stereo variant.
        FormatDescriptor { stereo: true, ..base.clone() },
        // 15 bit true color floor.
        FormatDescriptor {
            red_bits: 5,
            green_bits: 5,
            blue_bits: 5,
            alpha_bits: 0,
            depth_bits: 16,
            stencil_bits: 0,
            ..base.clone()
        },
    ];

    // Float formats are pbuffer only, like the hardware they model.
    formats.push(FormatDescriptor {
        float_components: true,
        draw_to_window: false,
        draw_to_bitmap: false,
        ..base.clone()
    });
    formats.push(FormatDescriptor {
        float_components: true,
        nv_float: true,
        draw_to_window: false,
        draw_to_bitmap: false,
        ..base
    });

    formats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilitiesBuilder;

    #[test]
    fn capabilities_round_trip_through_descriptor() {
        let requested = CapabilitiesBuilder::new()
            .with_color_sizes(8, 8, 8)
            .with_alpha_size(8)
            .with_depth_size(24)
            .with_stencil_size(8)
            .with_accum_sizes(16, 16, 16, 16)
            .with_double_buffer(true)
            .with_stereo(true)
            .with_multisampling(4)
            .with_surface_types(SurfaceTypes::WINDOW | SurfaceTypes::PBUFFER)
            .with_render_to_texture(true)
            .with_render_to_texture_rectangle(true)
            .build();

        let descriptor = FormatDescriptor::from_capabilities(&requested);
        let round_tripped = descriptor.to_capabilities(QueryPath::Extended);

        assert_eq!(round_tripped.red_size(), requested.red_size());
        assert_eq!(round_tripped.green_size(), requested.green_size());
        assert_eq!(round_tripped.blue_size(), requested.blue_size());
        assert_eq!(round_tripped.alpha_size(), requested.alpha_size());
        assert_eq!(round_tripped.depth_size(), requested.depth_size());
        assert_eq!(round_tripped.stencil_size(), requested.stencil_size());
        assert_eq!(round_tripped.accum_sizes(), requested.accum_sizes());
        assert_eq!(round_tripped.double_buffer(), requested.double_buffer());
        assert_eq!(round_tripped.stereo(), requested.stereo());
        assert_eq!(round_tripped.num_samples(), requested.num_samples());
        assert_eq!(round_tripped.surface_types(), requested.surface_types());
        assert_eq!(round_tripped.render_to_texture(), requested.render_to_texture());
        assert_eq!(
            round_tripped.render_to_texture_rectangle(),
            requested.render_to_texture_rectangle()
        );
    }

    #[test]
    fn legacy_projection_is_coarse() {
        let descriptor = FormatDescriptor {
            sample_buffers: true,
            samples: 8,
            draw_to_pbuffer: true,
            ..Default::default()
        };

        let coarse = descriptor.to_capabilities(QueryPath::Legacy);
        assert_eq!(coarse.num_samples(), None);
        assert!(!coarse.surface_types().contains(SurfaceTypes::PBUFFER));

        let precise = descriptor.to_capabilities(QueryPath::Extended);
        assert_eq!(precise.num_samples(), Some(8));
        assert!(precise.surface_types().contains(SurfaceTypes::PBUFFER));
    }
}
