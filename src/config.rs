// egl-runtime/src/config.rs
//
//! Frame buffer configurations.
//!
//! A display's configs are generated once, at initialization, from the pixel format of the
//! native display. They are immutable afterwards and shared by every context and surface created
//! against them.

use crate::backend::ClientApi;
use crate::egl::{self, EGLint};
use crate::handle::Handle;
use crate::platform::PixelFormat;
use crate::Error;

use bitflags::bitflags;
use std::cmp::Ordering;
use std::sync::Arc;

bitflags! {
    /// The kinds of surfaces a config can create (`EGL_SURFACE_TYPE`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SurfaceTypeFlags: EGLint {
        const PBUFFER = egl::PBUFFER_BIT;
        const PIXMAP  = egl::PIXMAP_BIT;
        const WINDOW  = egl::WINDOW_BIT;
    }
}

bitflags! {
    /// Client APIs a config supports (`EGL_RENDERABLE_TYPE`, `EGL_CONFORMANT`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RenderableType: EGLint {
        const OPENGL_ES  = egl::OPENGL_ES_BIT;
        const OPENVG     = egl::OPENVG_BIT;
        const OPENGL_ES2 = egl::OPENGL_ES2_BIT;
    }
}

impl RenderableType {
    /// Whether a context of `api` at `client_version` can render with this config.
    pub fn supports(self, api: ClientApi, client_version: EGLint) -> bool {
        match api {
            ClientApi::OpenGlEs if client_version >= 2 => self.contains(RenderableType::OPENGL_ES2),
            ClientApi::OpenGlEs => self.contains(RenderableType::OPENGL_ES),
            ClientApi::OpenVg => self.contains(RenderableType::OPENVG),
        }
    }

    #[inline]
    pub fn supports_gles(self) -> bool {
        self.intersects(RenderableType::OPENGL_ES | RenderableType::OPENGL_ES2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorBufferType {
    Rgb,
    Luminance,
}

impl ColorBufferType {
    fn to_enum(self) -> EGLint {
        match self {
            ColorBufferType::Rgb => egl::RGB_BUFFER,
            ColorBufferType::Luminance => egl::LUMINANCE_BUFFER,
        }
    }
}

/// The largest pbuffer dimension any config allows.
pub const MAX_PBUFFER_SIZE: EGLint = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub id: EGLint,
    pub buffer_size: EGLint,
    pub red_size: EGLint,
    pub green_size: EGLint,
    pub blue_size: EGLint,
    pub luminance_size: EGLint,
    pub alpha_size: EGLint,
    pub alpha_mask_size: EGLint,
    pub color_buffer_type: ColorBufferType,
    pub depth_size: EGLint,
    pub stencil_size: EGLint,
    pub samples: EGLint,
    pub sample_buffers: EGLint,
    pub surface_type: SurfaceTypeFlags,
    pub renderable_type: RenderableType,
    pub conformant: RenderableType,
    pub min_swap_interval: EGLint,
    pub max_swap_interval: EGLint,
    pub native_visual_id: EGLint,
    pub native_renderable: bool,
    pub bind_to_texture_rgb: bool,
    pub bind_to_texture_rgba: bool,
}

impl Config {
    /// Answers `eglGetConfigAttrib`.
    pub fn attrib(&self, attribute: EGLint) -> Result<EGLint, Error> {
        let value = match attribute {
            egl::CONFIG_ID => self.id,
            egl::BUFFER_SIZE => self.buffer_size,
            egl::RED_SIZE => self.red_size,
            egl::GREEN_SIZE => self.green_size,
            egl::BLUE_SIZE => self.blue_size,
            egl::LUMINANCE_SIZE => self.luminance_size,
            egl::ALPHA_SIZE => self.alpha_size,
            egl::ALPHA_MASK_SIZE => self.alpha_mask_size,
            egl::COLOR_BUFFER_TYPE => self.color_buffer_type.to_enum(),
            egl::DEPTH_SIZE => self.depth_size,
            egl::STENCIL_SIZE => self.stencil_size,
            egl::SAMPLES => self.samples,
            egl::SAMPLE_BUFFERS => self.sample_buffers,
            egl::SURFACE_TYPE => self.surface_type.bits(),
            egl::RENDERABLE_TYPE => self.renderable_type.bits(),
            egl::CONFORMANT => self.conformant.bits(),
            egl::MIN_SWAP_INTERVAL => self.min_swap_interval,
            egl::MAX_SWAP_INTERVAL => self.max_swap_interval,
            egl::NATIVE_VISUAL_ID => self.native_visual_id,
            egl::NATIVE_RENDERABLE => self.native_renderable as EGLint,
            egl::BIND_TO_TEXTURE_RGB => self.bind_to_texture_rgb as EGLint,
            egl::BIND_TO_TEXTURE_RGBA => self.bind_to_texture_rgba as EGLint,
            egl::CONFIG_CAVEAT => egl::NONE,
            egl::MAX_PBUFFER_WIDTH | egl::MAX_PBUFFER_HEIGHT => MAX_PBUFFER_SIZE,
            egl::MAX_PBUFFER_PIXELS => MAX_PBUFFER_SIZE * MAX_PBUFFER_SIZE,
            _ => return Err(Error::BadAttribute),
        };
        Ok(value)
    }

    /// Clamps a requested swap interval into the range this config supports.
    #[inline]
    pub fn clamp_swap_interval(&self, interval: EGLint) -> EGLint {
        interval.max(self.min_swap_interval).min(self.max_swap_interval)
    }
}

struct ColorLayout {
    red: EGLint,
    green: EGLint,
    blue: EGLint,
    alpha: EGLint,
    visual: EGLint,
}

const RGB565: ColorLayout = ColorLayout { red: 5, green: 6, blue: 5, alpha: 0, visual: 0x565 };
const RGBA8888: ColorLayout = ColorLayout { red: 8, green: 8, blue: 8, alpha: 8, visual: 0x8888 };
const RGBX8888: ColorLayout = ColorLayout { red: 8, green: 8, blue: 8, alpha: 0, visual: 0x888 };

// (depth, stencil, samples)
const ANCILLARY_BUFFERS: [(EGLint, EGLint, EGLint); 4] = [(0, 0, 0), (16, 0, 0), (24, 8, 0), (24, 8, 4)];

/// Builds the config list for a native display of the given pixel format.
///
/// Every color layout native to the format gets one config per combination of ancillary
/// buffers. A luminance config usable for OpenVG pbuffers is always appended.
pub(crate) fn generate_configs(format: PixelFormat) -> Vec<Config> {
    let layouts: &[ColorLayout] = match format {
        PixelFormat::Rgb565 => &[RGB565],
        PixelFormat::Rgba8888 => &[RGBA8888, RGBX8888, RGB565],
    };

    let mut configs = Vec::with_capacity(layouts.len() * ANCILLARY_BUFFERS.len() + 1);
    for (layout_index, layout) in layouts.iter().enumerate() {
        // Only the first layout matches the native window format.
        let native = layout_index == 0;
        for &(depth_size, stencil_size, samples) in ANCILLARY_BUFFERS.iter() {
            // OpenVG does not render to multisampled or depth-buffered targets here.
            let mut renderable_type = RenderableType::OPENGL_ES | RenderableType::OPENGL_ES2;
            if samples == 0 && depth_size == 0 {
                renderable_type |= RenderableType::OPENVG;
            }
            let mut surface_type = SurfaceTypeFlags::PBUFFER | SurfaceTypeFlags::PIXMAP;
            if native {
                surface_type |= SurfaceTypeFlags::WINDOW;
            }

            configs.push(Config {
                id: configs.len() as EGLint + 1,
                buffer_size: layout.red + layout.green + layout.blue + layout.alpha,
                red_size: layout.red,
                green_size: layout.green,
                blue_size: layout.blue,
                luminance_size: 0,
                alpha_size: layout.alpha,
                alpha_mask_size: if renderable_type.contains(RenderableType::OPENVG) { 8 } else { 0 },
                color_buffer_type: ColorBufferType::Rgb,
                depth_size,
                stencil_size,
                samples,
                sample_buffers: (samples > 0) as EGLint,
                surface_type,
                renderable_type,
                conformant: renderable_type,
                min_swap_interval: 0,
                max_swap_interval: 4,
                native_visual_id: if native { layout.visual } else { 0 },
                native_renderable: native,
                bind_to_texture_rgb: layout.alpha == 0,
                bind_to_texture_rgba: layout.alpha > 0,
            });
        }
    }

    configs.push(Config {
        id: configs.len() as EGLint + 1,
        buffer_size: 8,
        red_size: 0,
        green_size: 0,
        blue_size: 0,
        luminance_size: 8,
        alpha_size: 0,
        alpha_mask_size: 8,
        color_buffer_type: ColorBufferType::Luminance,
        depth_size: 0,
        stencil_size: 0,
        samples: 0,
        sample_buffers: 0,
        surface_type: SurfaceTypeFlags::PBUFFER,
        renderable_type: RenderableType::OPENVG,
        conformant: RenderableType::OPENVG,
        min_swap_interval: 0,
        max_swap_interval: 4,
        native_visual_id: 0,
        native_renderable: false,
        bind_to_texture_rgb: false,
        bind_to_texture_rgba: false,
    });

    configs
}

#[derive(Clone, Copy, PartialEq)]
enum Criterion {
    AtLeast,
    Exact,
    Mask,
}

fn criterion(attribute: EGLint) -> Option<Criterion> {
    match attribute {
        egl::BUFFER_SIZE
        | egl::RED_SIZE
        | egl::GREEN_SIZE
        | egl::BLUE_SIZE
        | egl::LUMINANCE_SIZE
        | egl::ALPHA_SIZE
        | egl::ALPHA_MASK_SIZE
        | egl::DEPTH_SIZE
        | egl::STENCIL_SIZE
        | egl::SAMPLES
        | egl::SAMPLE_BUFFERS => Some(Criterion::AtLeast),
        egl::CONFIG_ID
        | egl::COLOR_BUFFER_TYPE
        | egl::MIN_SWAP_INTERVAL
        | egl::MAX_SWAP_INTERVAL
        | egl::NATIVE_RENDERABLE
        | egl::NATIVE_VISUAL_ID
        | egl::BIND_TO_TEXTURE_RGB
        | egl::BIND_TO_TEXTURE_RGBA
        | egl::CONFIG_CAVEAT => Some(Criterion::Exact),
        egl::SURFACE_TYPE | egl::RENDERABLE_TYPE | egl::CONFORMANT => Some(Criterion::Mask),
        _ => None,
    }
}

/// Parsed `eglChooseConfig` attribute list.
struct Selection {
    requirements: Vec<(EGLint, EGLint)>,
    config_id: Option<EGLint>,
}

impl Selection {
    fn parse(attribs: &[EGLint]) -> Result<Selection, Error> {
        let mut requirements = vec![
            (egl::SURFACE_TYPE, egl::WINDOW_BIT),
            (egl::RENDERABLE_TYPE, egl::OPENGL_ES_BIT),
            (egl::COLOR_BUFFER_TYPE, egl::RGB_BUFFER),
        ];
        let mut config_id = None;

        for pair in attribs.chunks(2) {
            let attribute = pair[0];
            if attribute == egl::NONE {
                break;
            }
            let value = *pair.get(1).ok_or(Error::BadAttribute)?;
            if criterion(attribute).is_none() {
                return Err(Error::BadAttribute);
            }
            if attribute == egl::CONFIG_ID && value != egl::DONT_CARE {
                config_id = Some(value);
            }
            requirements.retain(|&(existing, _)| existing != attribute);
            requirements.push((attribute, value));
        }

        Ok(Selection { requirements, config_id })
    }

    fn matches(&self, config: &Config) -> bool {
        // A config ID overrides every other criterion.
        if let Some(config_id) = self.config_id {
            return config.id == config_id;
        }

        self.requirements.iter().all(|&(attribute, wanted)| {
            if wanted == egl::DONT_CARE {
                return true;
            }
            let actual = match config.attrib(attribute) {
                Ok(actual) => actual,
                Err(_) => return false,
            };
            match criterion(attribute) {
                Some(Criterion::AtLeast) => actual >= wanted,
                Some(Criterion::Exact) => actual == wanted,
                Some(Criterion::Mask) => actual & wanted == wanted,
                None => false,
            }
        })
    }

    fn requested(&self, attribute: EGLint) -> bool {
        self.requirements
            .iter()
            .any(|&(existing, value)| existing == attribute && value != egl::DONT_CARE && value > 0)
    }

    // Larger totals of the requested color channels sort first. Everything else prefers the
    // smallest buffers.
    fn compare(&self, a: &Config, b: &Config) -> Ordering {
        let color_bits = |config: &Config| {
            let mut bits = 0;
            for &(attribute, size) in &[
                (egl::RED_SIZE, config.red_size),
                (egl::GREEN_SIZE, config.green_size),
                (egl::BLUE_SIZE, config.blue_size),
                (egl::ALPHA_SIZE, config.alpha_size),
                (egl::LUMINANCE_SIZE, config.luminance_size),
            ] {
                if self.requested(attribute) {
                    bits += size;
                }
            }
            bits
        };

        (a.color_buffer_type != ColorBufferType::Rgb)
            .cmp(&(b.color_buffer_type != ColorBufferType::Rgb))
            .then_with(|| color_bits(b).cmp(&color_bits(a)))
            .then_with(|| a.buffer_size.cmp(&b.buffer_size))
            .then_with(|| a.sample_buffers.cmp(&b.sample_buffers))
            .then_with(|| a.samples.cmp(&b.samples))
            .then_with(|| a.depth_size.cmp(&b.depth_size))
            .then_with(|| a.stencil_size.cmp(&b.stencil_size))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Selects and sorts the configs matching an attribute list, best match first.
pub(crate) fn choose_configs<'a, I>(configs: I, attribs: &[EGLint]) -> Result<Vec<Handle>, Error>
where
    I: Iterator<Item = (Handle, &'a Arc<Config>)>,
{
    let selection = Selection::parse(attribs)?;
    let mut matching: Vec<(Handle, &Arc<Config>)> =
        configs.filter(|(_, config)| selection.matches(config)).collect();
    matching.sort_by(|(_, a), (_, b)| selection.compare(a, b));
    Ok(matching.into_iter().map(|(handle, _)| handle).collect())
}
