// egl-runtime/src/context.rs
//
//! Rendering contexts.

use crate::backend::{ApiContext, ClientApi, ContextRequest, Robustness};
use crate::config::{ColorBufferType, Config};
use crate::driver::DriverState;
use crate::egl::{self, EGLint};
use crate::handle::Handle;
use crate::lifetime::{Lifetime, Release};
use crate::surface::{Surface, SurfaceKind};
use crate::thread::{ThreadKey, ThreadState};
use crate::Error;

use log::{debug, trace};
use std::sync::Arc;

pub(crate) struct Context {
    pub(crate) api: ClientApi,
    pub(crate) api_context: ApiContext,
    pub(crate) config: Arc<Config>,
    pub(crate) client_version: EGLint,
    pub(crate) robustness: Robustness,
    /// The draw surface while the context is current.
    pub(crate) surface: Option<Handle>,
    pub(crate) lifetime: Lifetime,
    pub(crate) is_lost: bool,
    /// Pbuffers whose color buffer is bound as a texture image of this context.
    pub(crate) bound_surfaces: Vec<Handle>,
}

struct ContextAttributes {
    client_version: EGLint,
    robustness: Robustness,
}

fn parse_context_attributes(attribs: &[EGLint], api: ClientApi) -> Result<ContextAttributes, Error> {
    let mut attributes = ContextAttributes { client_version: 1, robustness: Robustness::default() };
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
            egl::CONTEXT_CLIENT_VERSION => {
                if api != ClientApi::OpenGlEs || (value != 1 && value != 2) {
                    return Err(Error::BadAttribute);
                }
                attributes.client_version = value;
            }
            egl::CONTEXT_OPENGL_ROBUST_ACCESS_EXT => match value {
                egl::FALSE => attributes.robustness.robust_access = false,
                egl::TRUE if api == ClientApi::OpenGlEs => attributes.robustness.robust_access = true,
                _ => return Err(Error::BadAttribute),
            },
            egl::CONTEXT_OPENGL_RESET_NOTIFICATION_STRATEGY_EXT => match value {
                egl::NO_RESET_NOTIFICATION_EXT | egl::LOSE_CONTEXT_ON_RESET_EXT => {
                    attributes.robustness.reset_notification_strategy = value;
                }
                _ => return Err(Error::BadAttribute),
            },
            _ => return Err(Error::BadAttribute),
        }
    }
    Ok(attributes)
}

/// Whether `surface` can be bound together with `context`.
pub(crate) fn compatible(context: &Context, surface: &Surface) -> bool {
    if Arc::ptr_eq(&context.config, &surface.config) {
        return true;
    }

    let (ours, theirs) = (&*context.config, &*surface.config);
    if ours.color_buffer_type != theirs.color_buffer_type || ours.alpha_size != theirs.alpha_size {
        return false;
    }
    if context.api == ClientApi::OpenGlEs
        && (ours.depth_size != theirs.depth_size || ours.stencil_size != theirs.stencil_size)
    {
        return false;
    }
    if !theirs.renderable_type.supports(context.api, context.client_version) {
        return false;
    }
    match ours.color_buffer_type {
        ColorBufferType::Rgb => {
            ours.red_size == theirs.red_size
                && ours.green_size == theirs.green_size
                && ours.blue_size == theirs.blue_size
        }
        ColorBufferType::Luminance => ours.luminance_size == theirs.luminance_size,
    }
}

impl DriverState {
    pub(crate) fn create_context(
        &mut self,
        tstate: &ThreadState,
        dpy: Handle,
        config: Handle,
        share: Handle,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let config = self.check_config(dpy, config)?;
        if self.check_display(dpy)?.is_terminating() {
            return Err(Error::NotInitialized);
        }
        let api = tstate.api.ok_or(Error::BadMatch)?;

        let share = match share.to_option() {
            None => None,
            Some(share) => match self.context(dpy, share) {
                Some(share) if share.api == api => Some(share.api_context),
                _ => return Err(Error::BadContext),
            },
        };
        let attributes = parse_context_attributes(attribs, api)?;
        if !config.renderable_type.supports(api, attributes.client_version) {
            return Err(Error::BadMatch);
        }

        let backend = self.backends.get_mut(api).ok_or(Error::BadMatch)?;
        let api_context = backend.create_context(&ContextRequest {
            config: &config,
            share,
            client_version: attributes.client_version,
            robustness: attributes.robustness,
        })?;

        let context = Context {
            api,
            api_context,
            config,
            client_version: attributes.client_version,
            robustness: attributes.robustness,
            surface: None,
            lifetime: Lifetime::new(),
            is_lost: false,
            bound_surfaces: vec![],
        };
        let inserted = match self.tables_mut(dpy) {
            Some(tables) => tables.contexts.insert(context),
            None => Err(Error::BadAlloc),
        };
        match inserted {
            Ok(handle) => {
                debug!("Created {:?} context {:?} on {:?}", api, handle, dpy);
                Ok(handle)
            }
            Err(err) => {
                if let Some(backend) = self.backends.get_mut(api) {
                    backend.release_context(api_context, tstate.key);
                }
                Err(err)
            }
        }
    }

    /// Frees a context once nothing references it. Returns the remaining reference count, 0 if
    /// the context was freed.
    pub(crate) fn release_context(&mut self, dpy: Handle, ctx: Handle, thread: ThreadKey) -> u32 {
        let tables = match self.tables_mut(dpy) {
            Some(tables) => tables,
            None => return 0,
        };
        match tables.contexts.get(ctx) {
            Some(context) if context.lifetime.references() != 0 => return context.lifetime.references(),
            Some(_) => {}
            None => return 0,
        }
        let context = match tables.contexts.remove(ctx) {
            Some(context) => context,
            None => return 0,
        };

        // Texture images bound to the context go away with it.
        let mut unbound = Vec::with_capacity(context.bound_surfaces.len());
        for &handle in context.bound_surfaces.iter() {
            if let Some(surface) = tables.surfaces.get_mut(handle) {
                surface.is_bound = false;
                unbound.push(surface.desc(handle));
            }
        }
        if let Some(backend) = self.backends.get_mut(context.api) {
            for desc in unbound.iter() {
                backend.release_tex_image(desc, thread);
            }
            backend.release_context(context.api_context, thread);
        }
        debug!("Freed context {:?} on {:?} ({:?})", ctx, dpy, context.robustness);
        0
    }

    /// Drops one reference to a context. Returns `true` if the context was freed.
    pub(crate) fn destroy_context_internal(
        &mut self,
        dpy: Handle,
        ctx: Handle,
        tag_invalid: bool,
        thread: ThreadKey,
    ) -> bool {
        let release = match self.context_mut(dpy, ctx) {
            Some(context) => context.lifetime.release(tag_invalid),
            None => return false,
        };
        match release {
            Release::Freed => self.release_context(dpy, ctx, thread) == 0,
            Release::Retained(references) => {
                trace!("Context {:?} still has {} references", ctx, references);
                false
            }
        }
    }

    /// Destroys a context on behalf of an application.
    ///
    /// The unvalidated form, without a thread state, is used by teardown paths that already
    /// hold a known-good handle.
    pub(crate) fn destroy_context(
        &mut self,
        tstate: Option<&ThreadState>,
        dpy: Handle,
        ctx: Handle,
        thread: ThreadKey,
    ) -> Result<(), Error> {
        if tstate.is_some() {
            let display = self.check_display(dpy)?;
            if !display.is_initialized() {
                return Err(Error::NotInitialized);
            }
            self.check_context(dpy, ctx)?;
            if self.check_display(dpy)?.is_terminating() {
                return Err(Error::NotInitialized);
            }
        }
        self.destroy_context_internal(dpy, ctx, true, thread);
        Ok(())
    }

    /// Destroys every context of a display. Returns `true` if all of them were freed.
    pub(crate) fn release_context_handles(&mut self, dpy: Handle, thread: ThreadKey) -> bool {
        let handles = match self.tables(dpy) {
            Some(tables) => tables.contexts.handles(),
            None => return true,
        };
        for handle in handles {
            self.destroy_context_internal(dpy, handle, true, thread);
        }
        self.tables(dpy).map_or(true, |tables| tables.contexts.is_empty())
    }

    pub(crate) fn query_context(&self, dpy: Handle, ctx: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.check_display_ready(dpy)?;
        let context = self.check_context(dpy, ctx)?;
        let value = match attribute {
            egl::CONTEXT_CLIENT_TYPE => context.api.to_enum() as EGLint,
            egl::CONTEXT_CLIENT_VERSION => context.client_version,
            egl::CONFIG_ID => context.config.id,
            egl::RENDER_BUFFER => {
                match context.surface.and_then(|surface| self.surface(dpy, surface)) {
                    Some(surface) if surface.kind == SurfaceKind::Pixmap => egl::SINGLE_BUFFER,
                    Some(_) => egl::BACK_BUFFER,
                    None => egl::NONE,
                }
            }
            _ => return Err(Error::BadAttribute),
        };
        Ok(value)
    }

    /// Marks every context of a display lost, as after a GPU reset. Returns how many were
    /// marked.
    pub(crate) fn lose_contexts(&mut self, dpy: Handle) -> Result<usize, Error> {
        self.check_display(dpy)?;
        let tables = match self.tables_mut(dpy) {
            Some(tables) => tables,
            None => return Ok(0),
        };
        let mut lost = 0;
        for (_, context) in tables.contexts.iter_mut() {
            context.is_lost = true;
            lost += 1;
        }
        debug!("Lost {} contexts on {:?}", lost, dpy);
        Ok(lost)
    }
}
