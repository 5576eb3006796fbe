// egl-runtime/src/make_current.rs
//
//! Binding and unbinding contexts and surfaces to the calling thread.
//!
//! A make-current runs in two steps. The release step drops every piece of the thread's old
//! binding for the context's client API that the new binding does not keep, freeing objects
//! whose last reference that was. The bind step takes references on the new pieces and asks the
//! backend to bind them. If the backend refuses, the pieces kept from the old binding are
//! released too and the slot is left empty, so the thread never holds a binding the backend
//! does not know about.
//!
//! References: a context or surface gains one reference per role it newly fills in a binding.
//! Keeping an object in the same role across a make-current neither adds nor drops one.

use crate::backend::{ApiContext, BindTarget, ClientApi, SurfaceDesc};
use crate::config::Config;
use crate::context;
use crate::driver::DriverState;
use crate::handle::Handle;
use crate::surface::SurfaceKind;
use crate::thread::{ApiBinding, ThreadState};
use crate::Error;

use log::{debug, trace};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Draw,
    Read,
}

impl DriverState {
    pub(crate) fn make_current(
        &mut self,
        tstate: &mut ThreadState,
        dpy: Handle,
        draw: Handle,
        read: Handle,
        ctx: Handle,
    ) -> Result<(), Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() {
            return Err(Error::NotInitialized);
        }
        // A draining display only accepts unbinding everything. Its objects no longer resolve,
        // so the triple is judged on the raw handles.
        if display.is_terminating() {
            if ctx.is_none() != draw.is_none() || ctx.is_none() != read.is_none() {
                return Err(Error::BadMatch);
            }
            if !ctx.is_none() {
                return Err(Error::NotInitialized);
            }
        }

        let ctx = match ctx.to_option() {
            Some(ctx) => Some(self.check_context(dpy, ctx).map(|_| ctx)?),
            None => None,
        };
        let draw = match draw.to_option() {
            Some(draw) => Some(self.check_surface(dpy, draw).map(|_| draw)?),
            None => None,
        };
        let read = match read.to_option() {
            Some(read) => Some(self.check_surface(dpy, read).map(|_| read)?),
            None => None,
        };
        let new = match (ctx, draw, read) {
            (None, None, None) => None,
            (Some(ctx), Some(draw), Some(read)) => Some((ctx, draw, read)),
            _ => return Err(Error::BadMatch),
        };

        let api = match new {
            Some((ctx, draw, read)) => {
                let context = self.check_context(dpy, ctx)?;
                if context.api == ClientApi::OpenVg && draw != read {
                    return Err(Error::BadMatch);
                }
                if context.is_lost {
                    return Err(Error::ContextLost);
                }
                context.api
            }
            None => match tstate.current_binding() {
                Some((api, _)) => api,
                // Nothing bound, nothing to release.
                None => return Ok(()),
            },
        };

        if let Some((ctx, draw, read)) = new {
            self.verify_context(tstate, api, dpy, ctx)?;
            self.verify_surface(tstate, dpy, read, ctx)?;
            self.verify_surface(tstate, dpy, draw, ctx)?;
        }

        let unchanged = match (tstate.binding(api), new) {
            (Some(binding), Some((ctx, draw, read))) => {
                binding.display == dpy
                    && binding.context == Some(ctx)
                    && binding.draw == Some(draw)
                    && binding.read == Some(read)
            }
            (Some(binding), None) => binding.is_empty(),
            (None, new) => new.is_none(),
        };
        if unchanged {
            return Ok(());
        }

        let (ctx, draw, read) = match new {
            Some(new) => new,
            None => {
                self.release_binding(tstate, api);
                return Ok(());
            }
        };
        self.release_step(tstate, api, dpy, new);
        self.bind_step(tstate, api, dpy, ctx, draw, read)
    }

    /// Drops everything a thread has bound for `api` and empties the slot. This is the release
    /// half of a make-current to nothing and never involves the backend's bind.
    pub(crate) fn release_binding(&mut self, tstate: &mut ThreadState, api: ClientApi) {
        let dpy = match tstate.binding(api) {
            Some(binding) => binding.display,
            None => return,
        };
        self.release_step(tstate, api, dpy, None);
        *tstate.slot_mut(api) = None;
        debug!("Unbound {:?} for {:?}", api, tstate.key);
    }

    // A context already current elsewhere may not be stolen.
    fn verify_context(&self, tstate: &ThreadState, api: ClientApi, dpy: Handle, ctx: Handle) -> Result<(), Error> {
        let context = self.check_context(dpy, ctx)?;
        let ours = tstate.binding(api).map_or(false, |binding| binding.holds_context(dpy, ctx));
        if context.lifetime.is_current() && !ours {
            return Err(Error::BadAccess);
        }
        Ok(())
    }

    fn verify_surface(&self, tstate: &ThreadState, dpy: Handle, handle: Handle, ctx: Handle) -> Result<(), Error> {
        let surface = self.check_surface(dpy, handle)?;
        let context = self.check_context(dpy, ctx)?;
        if surface.lifetime.is_current() && !tstate.surface_bound(dpy, handle) {
            return Err(Error::BadAccess);
        }
        if !context::compatible(context, surface) {
            return Err(Error::BadMatch);
        }
        if let (SurfaceKind::Window, Some(window)) = (surface.kind, surface.window) {
            let native = self.check_display(dpy)?.native;
            if !self.platform.window_valid(native, window) {
                trace!(target: "egl_runtime::trace", "surface {:?}: window {:?} resized or gone", handle, window);
                return Err(Error::BadNativeWindow);
            }
        }
        Ok(())
    }

    fn release_step(
        &mut self,
        tstate: &mut ThreadState,
        api: ClientApi,
        dpy: Handle,
        new: Option<(Handle, Handle, Handle)>,
    ) {
        let old = match tstate.binding(api) {
            Some(old) if old.context.is_some() => *old,
            _ => return,
        };
        let keeps = |old_handle: Option<Handle>, new_handle: Option<Handle>| {
            old.display == dpy && old_handle.is_some() && old_handle == new_handle
        };
        let keeps_context = keeps(old.context, new.map(|new| new.0));
        let keeps_draw = keeps(old.draw, new.map(|new| new.1));
        let keeps_read = keeps(old.read, new.map(|new| new.2));

        if !keeps_draw {
            if let Some(draw) = old.draw {
                self.flush_client_buffer(tstate.key, api, old.display, draw);
            }
        }

        if !keeps_context {
            self.release_bound_context(tstate, api);
        }
        if !keeps_draw {
            self.release_bound_surface(tstate, api, Role::Draw);
        }
        if !keeps_read {
            self.release_bound_surface(tstate, api, Role::Read);
        }

        self.complete_termination(old.display);
    }

    fn bind_step(
        &mut self,
        tstate: &mut ThreadState,
        api: ClientApi,
        dpy: Handle,
        ctx: Handle,
        draw: Handle,
        read: Handle,
    ) -> Result<(), Error> {
        let slot = tstate.slot_mut(api);
        let binding = slot.get_or_insert(ApiBinding::new(dpy));
        if binding.is_empty() {
            binding.display = dpy;
        }
        let retained = (binding.context == Some(ctx), binding.draw == Some(draw), binding.read == Some(read));

        let result = match self.bind_parts(dpy, ctx, draw, read) {
            Some((context, config, draw, read)) => {
                let target = BindTarget { context, config: &config, draw, read };
                match self.backends.get_mut(api) {
                    Some(backend) => backend.make_current(&target, tstate.key),
                    None => Err(Error::BadAlloc),
                }
            }
            None => Err(Error::BadAlloc),
        };

        if let Err(err) = result {
            debug!("Backend failed to bind {:?} for {:?}: {}", ctx, tstate.key, err);
            if retained.0 {
                self.release_bound_context(tstate, api);
            }
            if retained.1 {
                self.release_bound_surface(tstate, api, Role::Draw);
            }
            if retained.2 {
                self.release_bound_surface(tstate, api, Role::Read);
            }
            *tstate.slot_mut(api) = None;
            return Err(Error::BadAlloc);
        }

        *tstate.slot_mut(api) = Some(ApiBinding {
            display: dpy,
            context: Some(ctx),
            draw: Some(draw),
            read: Some(read),
        });
        if let Some(context) = self.context_mut(dpy, ctx) {
            context.lifetime.bind(!retained.0);
            context.surface = Some(draw);
        }
        if let Some(surface) = self.surface_mut(dpy, draw) {
            surface.lifetime.bind(!retained.1);
        }
        if let Some(surface) = self.surface_mut(dpy, read) {
            surface.lifetime.bind(!retained.2);
        }

        let interval = if self.platform.supports_vsync() { 1 } else { 0 };
        if let Some(surface) = self.surface_mut(dpy, draw) {
            surface.swap_interval = surface.config.clamp_swap_interval(interval);
        }
        debug!("Bound {:?} with {:?}/{:?} for {:?}", ctx, draw, read, tstate.key);
        Ok(())
    }

    /// Drops the context from a thread's binding for `api`, freeing it if that was its last
    /// reference.
    fn release_bound_context(&mut self, tstate: &mut ThreadState, api: ClientApi) {
        let (dpy, ctx) = match tstate.slot_mut(api) {
            Some(binding) => match binding.context.take() {
                Some(ctx) => (binding.display, ctx),
                None => return,
            },
            None => return,
        };

        if tstate.api == Some(api) {
            if let Some(backend) = self.backends.get_mut(api) {
                backend.remove_frame_builder(tstate.key);
            }
        }
        if let Some(context) = self.context_mut(dpy, ctx) {
            context.lifetime.unbind(false);
            context.surface = None;
        }
        self.destroy_context_internal(dpy, ctx, false, tstate.key);
    }

    fn release_bound_surface(&mut self, tstate: &mut ThreadState, api: ClientApi, role: Role) {
        let (dpy, handle) = match tstate.slot_mut(api) {
            Some(binding) => {
                let field = match role {
                    Role::Draw => &mut binding.draw,
                    Role::Read => &mut binding.read,
                };
                match field.take() {
                    Some(handle) => (binding.display, handle),
                    None => return,
                }
            }
            None => return,
        };

        let still_current = tstate.surface_bound(dpy, handle);
        if let Some(surface) = self.surface_mut(dpy, handle) {
            surface.lifetime.unbind(still_current);
        }
        let freed = self.destroy_surface_internal(dpy, handle, false);

        // A freed draw surface cannot still be the read surface.
        if freed && role == Role::Draw {
            if let Some(binding) = tstate.slot_mut(api) {
                if binding.read == Some(handle) {
                    binding.read = None;
                }
            }
        }
    }

    /// Everything a backend needs to bind a context and its surfaces. `None` if one of them no
    /// longer resolves.
    pub(crate) fn bind_parts(
        &self,
        dpy: Handle,
        ctx: Handle,
        draw: Handle,
        read: Handle,
    ) -> Option<(ApiContext, Arc<Config>, SurfaceDesc, SurfaceDesc)> {
        let context = self.context(dpy, ctx)?;
        let draw = self.surface(dpy, draw)?.desc(draw);
        let read = self.surface(dpy, read)?.desc(read);
        Some((context.api_context, context.config.clone(), draw, read))
    }
}
