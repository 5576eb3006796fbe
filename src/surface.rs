// egl-runtime/src/surface.rs
//
//! Window, pixmap and pbuffer surfaces.
//!
//! A surface is owned by its display's surface table. Its handle stays resolvable until the last
//! reference is dropped: destroying a surface that some thread has bound only tags it invalid,
//! and the final unbind removes it. Posting a frame takes the surface's frame lock, which nests
//! inside the main lock.

use crate::backend::{ClientApi, SurfaceDesc};
use crate::config::{Config, SurfaceTypeFlags, MAX_PBUFFER_SIZE};
use crate::driver::DriverState;
use crate::egl::{self, EGLenum, EGLint};
use crate::handle::Handle;
use crate::lifetime::{Lifetime, Release};
use crate::lock::{LockLevel, OrderedMutex};
use crate::platform::{NativePixmap, NativeWindow};
use crate::thread::{ThreadKey, ThreadState};
use crate::Error;

use euclid::default::Size2D;
use log::{debug, trace, warn};
use std::sync::Arc;

/// What a surface renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    Window,
    Pixmap,
    Pbuffer,
}

impl SurfaceKind {
    fn required_type(self) -> SurfaceTypeFlags {
        match self {
            SurfaceKind::Window => SurfaceTypeFlags::WINDOW,
            SurfaceKind::Pixmap => SurfaceTypeFlags::PIXMAP,
            SurfaceKind::Pbuffer => SurfaceTypeFlags::PBUFFER,
        }
    }
}

/// Counters guarded by a surface's frame lock.
#[derive(Debug, Default)]
pub(crate) struct FrameState {
    pub(crate) frames_posted: u64,
    pub(crate) pbuffer_posts: u64,
}

pub(crate) struct Surface {
    pub(crate) kind: SurfaceKind,
    pub(crate) window: Option<NativeWindow>,
    pub(crate) pixmap: Option<NativePixmap>,
    /// The OpenVG image a pbuffer wraps, if it was created from one.
    pub(crate) client_buffer: Option<u64>,
    pub(crate) size: Size2D<i32>,
    pub(crate) config: Arc<Config>,
    pub(crate) lifetime: Lifetime,
    pub(crate) is_bound: bool,
    pub(crate) texture_format: EGLint,
    pub(crate) texture_target: EGLint,
    pub(crate) mipmap_texture: bool,
    pub(crate) mipmap_level: EGLint,
    pub(crate) largest_pbuffer: bool,
    pub(crate) swap_interval: EGLint,
    pub(crate) render_buffer: EGLint,
    pub(crate) swap_behavior: EGLint,
    pub(crate) frame: Arc<OrderedMutex<FrameState>>,
}

impl Surface {
    fn new(kind: SurfaceKind, config: Arc<Config>) -> Surface {
        let render_buffer = match kind {
            SurfaceKind::Pixmap => egl::SINGLE_BUFFER,
            SurfaceKind::Window | SurfaceKind::Pbuffer => egl::BACK_BUFFER,
        };
        Surface {
            kind,
            window: None,
            pixmap: None,
            client_buffer: None,
            size: Size2D::zero(),
            config,
            lifetime: Lifetime::new(),
            is_bound: false,
            texture_format: egl::NO_TEXTURE,
            texture_target: egl::NO_TEXTURE,
            mipmap_texture: false,
            mipmap_level: 0,
            largest_pbuffer: false,
            swap_interval: 1,
            render_buffer,
            swap_behavior: egl::BUFFER_DESTROYED,
            frame: Arc::new(OrderedMutex::new(LockLevel::Surface, FrameState::default())),
        }
    }

    pub(crate) fn desc(&self, handle: Handle) -> SurfaceDesc {
        SurfaceDesc { surface: handle, kind: self.kind, size: self.size }
    }

    /// Counts a flush of this pbuffer into its client buffer. Returns whether there was anything
    /// to flush.
    fn post_to_pbuffer(&self) -> bool {
        if self.kind != SurfaceKind::Pbuffer || self.is_bound || self.client_buffer.is_none() {
            return false;
        }
        let mut frame = self.frame.lock();
        frame.pbuffer_posts += 1;
        true
    }

    pub(crate) fn frames_posted(&self) -> u64 {
        self.frame.lock().frames_posted
    }

    fn parse_attributes(&mut self, attribs: &[EGLint]) -> Result<(), Error> {
        for pair in attribs.chunks(2) {
            let attribute = pair[0];
            if attribute == egl::NONE {
                break;
            }
            let value = match pair.get(1) {
                Some(&value) => value,
                None => return Err(Error::BadAttribute),
            };

            match attribute {
                egl::RENDER_BUFFER => {
                    if value != egl::BACK_BUFFER && value != egl::SINGLE_BUFFER {
                        return Err(Error::BadAttribute);
                    }
                    // Window surfaces are always back buffered.
                }
                egl::WIDTH | egl::HEIGHT => {
                    if self.kind != SurfaceKind::Pbuffer {
                        return Err(Error::BadAttribute);
                    }
                    if value < 0 || value > MAX_PBUFFER_SIZE {
                        return Err(Error::BadParameter);
                    }
                    if attribute == egl::WIDTH {
                        self.size.width = value;
                    } else {
                        self.size.height = value;
                    }
                }
                egl::TEXTURE_FORMAT => {
                    if self.kind != SurfaceKind::Pbuffer || !self.config.renderable_type.supports_gles() {
                        return Err(Error::BadAttribute);
                    }
                    match value {
                        egl::NO_TEXTURE => {}
                        egl::TEXTURE_RGB if !self.config.bind_to_texture_rgb => return Err(Error::BadMatch),
                        egl::TEXTURE_RGBA if !self.config.bind_to_texture_rgba => return Err(Error::BadMatch),
                        egl::TEXTURE_RGB | egl::TEXTURE_RGBA => {}
                        _ => return Err(Error::BadAttribute),
                    }
                    self.texture_format = value;
                }
                egl::TEXTURE_TARGET => {
                    if self.kind != SurfaceKind::Pbuffer || !self.config.renderable_type.supports_gles() {
                        return Err(Error::BadAttribute);
                    }
                    if value != egl::NO_TEXTURE && value != egl::TEXTURE_2D {
                        return Err(Error::BadAttribute);
                    }
                    self.texture_target = value;
                }
                egl::MIPMAP_TEXTURE => {
                    if self.kind != SurfaceKind::Pbuffer {
                        return Err(Error::BadAttribute);
                    }
                    self.mipmap_texture = parse_bool(value)?;
                }
                egl::LARGEST_PBUFFER => {
                    if self.kind != SurfaceKind::Pbuffer {
                        return Err(Error::BadAttribute);
                    }
                    self.largest_pbuffer = parse_bool(value)?;
                }
                _ => return Err(Error::BadAttribute),
            }
        }

        if (self.texture_format == egl::NO_TEXTURE) != (self.texture_target == egl::NO_TEXTURE) {
            return Err(Error::BadMatch);
        }
        Ok(())
    }
}

fn parse_bool(value: EGLint) -> Result<bool, Error> {
    match value {
        egl::FALSE => Ok(false),
        egl::TRUE => Ok(true),
        _ => Err(Error::BadAttribute),
    }
}

impl DriverState {
    // Display, config and surface type checks shared by the three create entrypoints.
    fn new_surface(&self, dpy: Handle, config: Handle, kind: SurfaceKind) -> Result<Surface, Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let config = self.check_config(dpy, config)?;
        if display.is_terminating() {
            return Err(Error::NotInitialized);
        }
        if !config.surface_type.contains(kind.required_type()) {
            return Err(Error::BadMatch);
        }
        Ok(Surface::new(kind, config))
    }

    fn insert_surface(&mut self, dpy: Handle, surface: Surface) -> Result<Handle, Error> {
        let kind = surface.kind;
        let tables = self.tables_mut(dpy).ok_or(Error::NotInitialized)?;
        let handle = tables.surfaces.insert(surface)?;
        debug!("Created {:?} surface {:?} on {:?}", kind, handle, dpy);
        Ok(handle)
    }

    pub(crate) fn create_window_surface(
        &mut self,
        dpy: Handle,
        config: Handle,
        window: NativeWindow,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let mut surface = self.new_surface(dpy, config, SurfaceKind::Window)?;
        let native = self.check_display(dpy)?.native;
        if !self.platform.window_valid(native, window) {
            return Err(Error::BadNativeWindow);
        }
        let tables = self.tables(dpy).ok_or(Error::NotInitialized)?;
        if tables.surfaces.find(|surface| surface.window == Some(window)).is_some() {
            return Err(Error::BadAlloc);
        }

        surface.size = self.platform.window_size(native, window).ok_or(Error::BadNativeWindow)?;
        surface.window = Some(window);
        surface.parse_attributes(attribs)?;
        self.insert_surface(dpy, surface)
    }

    pub(crate) fn create_pixmap_surface(
        &mut self,
        dpy: Handle,
        config: Handle,
        pixmap: NativePixmap,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let mut surface = self.new_surface(dpy, config, SurfaceKind::Pixmap)?;
        let native = self.check_display(dpy)?.native;
        if !self.platform.pixmap_valid(native, pixmap) {
            return Err(Error::BadNativePixmap);
        }
        let tables = self.tables(dpy).ok_or(Error::NotInitialized)?;
        if tables.surfaces.find(|surface| surface.pixmap == Some(pixmap)).is_some() {
            return Err(Error::BadAlloc);
        }

        surface.size = self.platform.pixmap_size(native, pixmap).ok_or(Error::BadNativePixmap)?;
        surface.pixmap = Some(pixmap);
        surface.parse_attributes(attribs)?;
        self.insert_surface(dpy, surface)
    }

    pub(crate) fn create_pbuffer_surface(
        &mut self,
        dpy: Handle,
        config: Handle,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let mut surface = self.new_surface(dpy, config, SurfaceKind::Pbuffer)?;
        surface.parse_attributes(attribs)?;
        self.insert_surface(dpy, surface)
    }

    /// Wraps an OpenVG image in a pbuffer. The image's size wins over any size in `attribs`.
    pub(crate) fn create_pbuffer_from_client_buffer(
        &mut self,
        tstate: &ThreadState,
        dpy: Handle,
        buffer_type: EGLenum,
        buffer: u64,
        config: Handle,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let mut surface = self.new_surface(dpy, config, SurfaceKind::Pbuffer)?;
        if buffer_type != egl::OPENVG_IMAGE || buffer == 0 {
            return Err(Error::BadParameter);
        }

        let binding = match tstate.binding(ClientApi::OpenVg) {
            Some(binding) if binding.context.is_some() => *binding,
            _ => return Err(Error::BadAccess),
        };
        let ctx = binding.context.ok_or(Error::BadAccess)?;
        let api_context = self.context(binding.display, ctx).ok_or(Error::BadAccess)?.api_context;
        let tables = self.tables(dpy).ok_or(Error::NotInitialized)?;
        if tables.surfaces.find(|surface| surface.client_buffer == Some(buffer)).is_some() {
            return Err(Error::BadAccess);
        }
        if !surface.config.renderable_type.supports(ClientApi::OpenVg, 1) {
            return Err(Error::BadMatch);
        }

        let config = surface.config.clone();
        let backend = self.backends.get_mut(ClientApi::OpenVg).ok_or(Error::BadAccess)?;
        let size = backend.client_buffer_size(api_context, buffer, &config)?;

        let attribs: Vec<EGLint> = attribs
            .chunks(2)
            .take_while(|pair| pair[0] != egl::NONE)
            .filter(|pair| {
                !matches!(pair[0], egl::WIDTH | egl::HEIGHT | egl::VG_COLORSPACE | egl::VG_ALPHA_FORMAT)
            })
            .flatten()
            .cloned()
            .chain(Some(egl::NONE))
            .collect();
        surface.parse_attributes(&attribs)?;
        surface.size = size;
        surface.client_buffer = Some(buffer);
        self.insert_surface(dpy, surface)
    }

    /// Flushes rendering into the client buffer of a pbuffer `thread` is about to unbind.
    pub(crate) fn flush_client_buffer(&mut self, thread: ThreadKey, api: ClientApi, dpy: Handle, handle: Handle) {
        let desc = match self.surface(dpy, handle) {
            Some(surface) if surface.post_to_pbuffer() => surface.desc(handle),
            _ => return,
        };
        if let Some(backend) = self.backends.get_mut(api) {
            if let Err(err) = backend.flush_to_client_buffer(&desc, thread) {
                warn!("Failed to flush {:?} into its client buffer: {}", handle, err);
            }
        }
    }

    /// Drops the creating reference to a surface (or, from the binding code, a binding
    /// reference). Returns `true` if the surface was freed.
    pub(crate) fn destroy_surface_internal(&mut self, dpy: Handle, handle: Handle, tag_invalid: bool) -> bool {
        let tables = match self.tables_mut(dpy) {
            Some(tables) => tables,
            None => return false,
        };
        let release = match tables.surfaces.get_mut(handle) {
            Some(surface) => surface.lifetime.release(tag_invalid),
            None => return false,
        };
        if let Release::Retained(references) = release {
            trace!("Surface {:?} still has {} references", handle, references);
            return false;
        }

        // Wait out any frame being posted before the surface goes away.
        let frame = match tables.surfaces.get(handle) {
            Some(surface) => surface.frame.clone(),
            None => return false,
        };
        let _frame = frame.lock();
        let surface = tables.surfaces.remove(handle);
        if surface.as_ref().map_or(false, |surface| surface.is_bound) {
            for (_, context) in tables.contexts.iter_mut() {
                context.bound_surfaces.retain(|&bound| bound != handle);
            }
        }
        debug!("Freed surface {:?} on {:?}", handle, dpy);
        true
    }

    pub(crate) fn destroy_surface(&mut self, dpy: Handle, surface: Handle) -> Result<(), Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() {
            return Err(Error::NotInitialized);
        }
        self.check_surface(dpy, surface)?;
        if self.check_display(dpy)?.is_terminating() {
            return Err(Error::NotInitialized);
        }
        self.destroy_surface_internal(dpy, surface, true);
        Ok(())
    }

    /// Destroys every surface of a display. Returns `true` if all of them were freed.
    pub(crate) fn release_surface_handles(&mut self, dpy: Handle) -> bool {
        let handles = match self.tables(dpy) {
            Some(tables) => tables.surfaces.handles(),
            None => return true,
        };
        for handle in handles {
            self.destroy_surface_internal(dpy, handle, true);
        }
        self.tables(dpy).map_or(true, |tables| tables.surfaces.is_empty())
    }

    pub(crate) fn query_surface(&self, dpy: Handle, handle: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        let display = self.check_display_ready(dpy)?;
        let surface = self.check_surface(dpy, handle)?;

        // Windows can be resized behind our back.
        let size = match (surface.kind, surface.window) {
            (SurfaceKind::Window, Some(window)) => {
                self.platform.window_size(display.native, window).unwrap_or(surface.size)
            }
            _ => surface.size,
        };

        let value = match attribute {
            egl::CONFIG_ID => surface.config.id,
            egl::WIDTH => size.width,
            egl::HEIGHT => size.height,
            egl::LARGEST_PBUFFER => surface.largest_pbuffer as EGLint,
            egl::TEXTURE_FORMAT => surface.texture_format,
            egl::TEXTURE_TARGET => surface.texture_target,
            egl::MIPMAP_TEXTURE => surface.mipmap_texture as EGLint,
            egl::MIPMAP_LEVEL => surface.mipmap_level,
            egl::RENDER_BUFFER => surface.render_buffer,
            egl::SWAP_BEHAVIOR => surface.swap_behavior,
            _ => return Err(Error::BadAttribute),
        };
        Ok(value)
    }

    pub(crate) fn surface_attrib(
        &mut self,
        dpy: Handle,
        handle: Handle,
        attribute: EGLint,
        value: EGLint,
    ) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        self.check_surface(dpy, handle)?;
        let surface = self.surface_mut(dpy, handle).ok_or(Error::BadSurface)?;
        match attribute {
            egl::MIPMAP_LEVEL => {
                if !surface.config.renderable_type.supports_gles() {
                    return Err(Error::BadParameter);
                }
                surface.mipmap_level = value;
            }
            egl::SWAP_BEHAVIOR => match value {
                egl::BUFFER_DESTROYED => surface.swap_behavior = value,
                egl::BUFFER_PRESERVED => return Err(Error::BadMatch),
                _ => return Err(Error::BadParameter),
            },
            _ => return Err(Error::BadAttribute),
        }
        Ok(())
    }

    /// Posts the back buffer of a window surface that is current to the calling thread.
    pub(crate) fn swap_buffers(&mut self, tstate: &mut ThreadState, dpy: Handle, handle: Handle) -> Result<(), Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let native = display.native;
        self.check_surface(dpy, handle)?;
        if self.check_display(dpy)?.is_terminating() {
            return Err(Error::NotInitialized);
        }

        let binding = match tstate.current_binding() {
            Some((_, binding)) => *binding,
            None => return Err(Error::BadContext),
        };
        let ctx = binding.context.ok_or(Error::BadContext)?;
        if self.context(binding.display, ctx).map_or(false, |context| context.is_lost) {
            return Err(Error::ContextLost);
        }
        if !binding.holds_surface(dpy, handle) || binding.draw != Some(handle) {
            return Err(Error::BadSurface);
        }

        let surface = self.surface(dpy, handle).ok_or(Error::BadSurface)?;
        if surface.kind != SurfaceKind::Window || surface.render_buffer == egl::SINGLE_BUFFER {
            return Ok(());
        }
        let window = surface.window.ok_or(Error::BadNativeWindow)?;
        if !self.platform.window_valid(native, window) {
            return Err(Error::BadNativeWindow);
        }
        let size = self.platform.window_size(native, window);

        let frames_posted = {
            let mut frame = surface.frame.lock();
            frame.frames_posted += 1;
            frame.frames_posted
        };
        if let Some(surface) = self.surface_mut(dpy, handle) {
            if let Some(size) = size {
                surface.size = size;
            }
        }
        match tstate.current_sync.as_mut() {
            Some(sync) => {
                sync.frames += 1;
                trace!("Posted frame {} of {:?} on sync node {}", frames_posted, handle, sync.id);
            }
            None => trace!("Posted frame {} of {:?}", frames_posted, handle),
        }
        Ok(())
    }

    pub(crate) fn swap_interval(&mut self, tstate: &ThreadState, dpy: Handle, interval: EGLint) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        let binding = match tstate.current_binding() {
            Some((_, binding)) if binding.context.is_some() => *binding,
            _ => return Err(Error::BadContext),
        };
        let draw = binding.draw.ok_or(Error::BadSurface)?;
        let surface = self.surface_mut(binding.display, draw).ok_or(Error::BadSurface)?;
        surface.swap_interval = surface.config.clamp_swap_interval(interval);
        Ok(())
    }

    /// Binds a pbuffer's color buffer as the texture image of the current GLES context.
    pub(crate) fn bind_tex_image(
        &mut self,
        tstate: &ThreadState,
        dpy: Handle,
        handle: Handle,
        buffer: EGLint,
    ) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        let surface = self.check_surface(dpy, handle)?;
        if buffer != egl::BACK_BUFFER {
            return Err(Error::BadParameter);
        }
        if surface.is_bound {
            return Err(Error::BadAccess);
        }
        if surface.kind != SurfaceKind::Pbuffer || !surface.config.renderable_type.supports_gles() {
            return Err(Error::BadSurface);
        }
        if surface.texture_format == egl::NO_TEXTURE {
            return Err(Error::BadMatch);
        }
        let desc = surface.desc(handle);

        let binding = match tstate.current_binding() {
            Some((ClientApi::OpenGlEs, binding)) => *binding,
            // Nothing to bind to.
            _ => return Ok(()),
        };
        let ctx = match binding.context {
            Some(ctx) => ctx,
            None => return Ok(()),
        };

        let context = self.context_mut(binding.display, ctx).ok_or(Error::BadContext)?;
        context.bound_surfaces.push(handle);
        let result = match self.backends.get_mut(ClientApi::OpenGlEs) {
            Some(backend) => backend.bind_tex_image(&desc, tstate.key),
            None => Err(Error::BadContext),
        };
        if let Err(err) = result {
            if let Some(context) = self.context_mut(binding.display, ctx) {
                context.bound_surfaces.retain(|&bound| bound != handle);
            }
            return Err(err);
        }
        if let Some(surface) = self.surface_mut(dpy, handle) {
            surface.is_bound = true;
        }
        Ok(())
    }

    pub(crate) fn release_tex_image(
        &mut self,
        tstate: &ThreadState,
        dpy: Handle,
        handle: Handle,
        buffer: EGLint,
    ) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        let surface = self.check_surface(dpy, handle)?;
        if buffer != egl::BACK_BUFFER {
            return Err(Error::BadParameter);
        }
        if !surface.is_bound {
            return Err(Error::BadAccess);
        }
        let desc = surface.desc(handle);

        match tstate.binding(ClientApi::OpenGlEs) {
            Some(binding) if binding.context.is_some() => {}
            _ => return Err(Error::BadContext),
        }
        // The texture image may have been bound while another GLES context was current.
        if let Some(tables) = self.tables_mut(dpy) {
            for (_, context) in tables.contexts.iter_mut() {
                context.bound_surfaces.retain(|&bound| bound != handle);
            }
        }
        if let Some(backend) = self.backends.get_mut(ClientApi::OpenGlEs) {
            backend.release_tex_image(&desc, tstate.key);
        }
        if let Some(surface) = self.surface_mut(dpy, handle) {
            surface.is_bound = false;
        }
        Ok(())
    }
}
