// egl-runtime/src/wait.rs
//
//! Ordering client API rendering against native rendering, and copying color buffers out to
//! native pixmaps.
//!
//! Only pixmap surfaces are shared with the native windowing system, so both waits are no-ops
//! unless the thread's current draw surface is a pixmap.

use crate::backend::ClientApi;
use crate::driver::DriverState;
use crate::egl::{self, EGLint};
use crate::handle::Handle;
use crate::platform::NativePixmap;
use crate::surface::SurfaceKind;
use crate::thread::{ApiBinding, ThreadState};
use crate::Error;

use log::debug;

impl DriverState {
    /// Makes rendering of the active API visible to native code, by resolving a current pixmap
    /// surface into its pixmap.
    pub(crate) fn wait_client(&mut self, tstate: &ThreadState) -> Result<(), Error> {
        match tstate.current_binding() {
            Some((api, binding)) => {
                let binding = *binding;
                self.flush_to_pixmap(tstate, api, &binding)
            }
            None => Ok(()),
        }
    }

    /// `wait_client` for the OpenGL ES binding, whichever API is active.
    pub(crate) fn wait_gl(&mut self, tstate: &ThreadState) -> Result<(), Error> {
        match tstate.binding(ClientApi::OpenGlEs) {
            Some(binding) => {
                let binding = *binding;
                self.flush_to_pixmap(tstate, ClientApi::OpenGlEs, &binding)
            }
            None => Ok(()),
        }
    }

    fn flush_to_pixmap(&mut self, tstate: &ThreadState, api: ClientApi, binding: &ApiBinding) -> Result<(), Error> {
        let (ctx, draw) = match (binding.context, binding.draw) {
            (Some(ctx), Some(draw)) => (ctx, draw),
            _ => return Ok(()),
        };
        if self.context(binding.display, ctx).is_none() {
            return Ok(());
        }
        let (desc, pixmap) = match self.surface(binding.display, draw) {
            Some(surface) if surface.kind == SurfaceKind::Pixmap => match surface.pixmap {
                Some(pixmap) => (surface.desc(draw), pixmap),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        let backend = self.backends.get_mut(api).ok_or(Error::BadAlloc)?;
        backend.copy_to_pixmap(&desc, pixmap, tstate.key).map_err(|err| {
            debug!("Failed to resolve {:?} into {:?}: {}", draw, pixmap, err);
            Error::BadAlloc
        })
    }

    /// Makes native rendering visible to the active API.
    pub(crate) fn wait_native(&mut self, tstate: &ThreadState, engine: EGLint) -> Result<(), Error> {
        let binding = match tstate.current_binding() {
            Some((_, binding)) if binding.context.is_some() => *binding,
            _ => return Ok(()),
        };
        let is_pixmap = binding
            .draw
            .and_then(|draw| self.surface(binding.display, draw))
            .map_or(false, |surface| surface.kind == SurfaceKind::Pixmap);
        if !is_pixmap {
            return Ok(());
        }
        if engine != egl::CORE_NATIVE_ENGINE {
            return Err(Error::BadParameter);
        }
        self.platform.wait_native(engine).map_err(|err| {
            debug!("Native wait failed: {}", err);
            Error::BadAlloc
        })
    }

    /// Copies the color buffer of the calling thread's draw surface into a native pixmap.
    pub(crate) fn copy_buffers(
        &mut self,
        tstate: &ThreadState,
        dpy: Handle,
        handle: Handle,
        target: NativePixmap,
    ) -> Result<(), Error> {
        let native = self.check_display_ready(dpy)?.native;
        if !self.platform.pixmap_valid(native, target) {
            return Err(Error::BadNativePixmap);
        }
        self.check_surface(dpy, handle)?;

        let (api, binding) = match tstate.current_binding() {
            Some((api, binding)) if binding.context.is_some() => (api, *binding),
            _ => return Err(Error::BadContext),
        };
        let ctx = binding.context.ok_or(Error::BadContext)?;
        if self.context(binding.display, ctx).map_or(false, |context| context.is_lost) {
            return Err(Error::ContextLost);
        }
        if binding.display != dpy || binding.draw != Some(handle) {
            return Err(Error::BadSurface);
        }

        let desc = self.check_surface(dpy, handle)?.desc(handle);
        if !self.platform.pixmap_copy_compatible(native, target, desc.size) {
            return Err(Error::BadMatch);
        }
        let backend = self.backends.get_mut(api).ok_or(Error::BadContext)?;
        backend.copy_to_pixmap(&desc, target, tstate.key).map_err(|err| {
            debug!("Failed to copy {:?} into {:?}: {}", handle, target, err);
            Error::BadAlloc
        })
    }
}
