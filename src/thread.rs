// egl-runtime/src/thread.rs
//
//! Per-thread binding state.
//!
//! Every OS thread that calls into a driver gets a `ThreadState`: the client API it has
//! selected, one binding slot per client API, and its pending error. The states live in a table
//! keyed by thread identity, behind its own lock.
//!
//! A thread that exits without releasing its state leaves the entry behind. OS thread
//! identities are recycled, so the next thread to present the same identity finds the entry,
//! and the stale bindings are unwound before the new state is installed. Identities must not
//! collide while both threads are alive; `pthread_self` guarantees this.

use crate::backend::{BindTarget, ClientApi};
use crate::driver::DriverState;
use crate::egl::{self, EGLenum, EGLint};
use crate::handle::Handle;
use crate::Error;

use fnv::FnvHashMap;
use log::{debug, warn};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Identifies a thread in a driver's thread table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadKey(pub u64);

/// How a driver names the calling thread.
#[derive(Clone)]
pub enum ThreadIdentity {
    /// The OS thread identity (`pthread_self`). Reused after a thread exits.
    Os,
    /// A caller-supplied identity function.
    Custom(Arc<dyn Fn() -> u64 + Send + Sync>),
}

impl Default for ThreadIdentity {
    fn default() -> ThreadIdentity {
        ThreadIdentity::Os
    }
}

impl Debug for ThreadIdentity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            ThreadIdentity::Os => write!(f, "Os"),
            ThreadIdentity::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl ThreadIdentity {
    pub fn current(&self) -> ThreadKey {
        match *self {
            ThreadIdentity::Os => ThreadKey(os_thread_id()),
            ThreadIdentity::Custom(ref identity) => ThreadKey(identity()),
        }
    }
}

#[cfg(unix)]
fn os_thread_id() -> u64 {
    unsafe { libc::pthread_self() as usize as u64 }
}

#[cfg(not(unix))]
fn os_thread_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

/// What one client API has bound on a thread.
///
/// Between entrypoints a binding is either absent or complete; the fields are only partially
/// set while a make-current is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ApiBinding {
    pub(crate) display: Handle,
    pub(crate) context: Option<Handle>,
    pub(crate) draw: Option<Handle>,
    pub(crate) read: Option<Handle>,
}

impl ApiBinding {
    pub(crate) fn new(display: Handle) -> ApiBinding {
        ApiBinding { display, context: None, draw: None, read: None }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.context.is_none() && self.draw.is_none() && self.read.is_none()
    }

    #[inline]
    pub(crate) fn holds_context(&self, dpy: Handle, ctx: Handle) -> bool {
        self.display == dpy && self.context == Some(ctx)
    }

    #[inline]
    pub(crate) fn holds_surface(&self, dpy: Handle, surface: Handle) -> bool {
        self.display == dpy && (self.draw == Some(surface) || self.read == Some(surface))
    }
}

/// The per-thread node posted frames are stamped into.
#[derive(Debug)]
pub(crate) struct SyncNode {
    pub(crate) id: u64,
    pub(crate) frames: u64,
}

pub(crate) struct ThreadState {
    pub(crate) key: ThreadKey,
    pub(crate) api: Option<ClientApi>,
    pub(crate) gles: Option<ApiBinding>,
    pub(crate) vg: Option<ApiBinding>,
    pub(crate) error: EGLint,
    pub(crate) current_sync: Option<SyncNode>,
}

impl ThreadState {
    pub(crate) fn new(key: ThreadKey, api: Option<ClientApi>) -> ThreadState {
        ThreadState { key, api, gles: None, vg: None, error: egl::SUCCESS, current_sync: None }
    }

    pub(crate) fn binding(&self, api: ClientApi) -> Option<&ApiBinding> {
        match api {
            ClientApi::OpenGlEs => self.gles.as_ref(),
            ClientApi::OpenVg => self.vg.as_ref(),
        }
    }

    pub(crate) fn slot_mut(&mut self, api: ClientApi) -> &mut Option<ApiBinding> {
        match api {
            ClientApi::OpenGlEs => &mut self.gles,
            ClientApi::OpenVg => &mut self.vg,
        }
    }

    /// The binding of the thread's active client API. `None` is not an error: the thread may
    /// have no API selected, or nothing bound for it.
    pub(crate) fn current_binding(&self) -> Option<(ClientApi, &ApiBinding)> {
        let api = self.api?;
        self.binding(api).map(|binding| (api, binding))
    }

    /// Whether `surface` is bound in either of this thread's slots.
    pub(crate) fn surface_bound(&self, dpy: Handle, surface: Handle) -> bool {
        ClientApi::ALL.iter().any(|&api| {
            self.binding(api).map_or(false, |binding| binding.holds_surface(dpy, surface))
        })
    }

    pub(crate) fn query_api(&self) -> EGLenum {
        match self.api {
            Some(api) => api.to_enum(),
            None => egl::NONE as EGLenum,
        }
    }

    pub(crate) fn current_context(&self) -> Handle {
        self.current_binding()
            .and_then(|(_, binding)| binding.context)
            .unwrap_or(Handle::NONE)
    }

    pub(crate) fn current_surface(&self, which: EGLint) -> Result<Handle, Error> {
        let binding = self.current_binding().map(|(_, binding)| binding);
        let surface = match which {
            egl::DRAW => binding.and_then(|binding| binding.draw),
            egl::READ => binding.and_then(|binding| binding.read),
            _ => return Err(Error::BadParameter),
        };
        Ok(surface.unwrap_or(Handle::NONE))
    }

    pub(crate) fn current_display(&self) -> Handle {
        match self.current_binding() {
            Some((_, binding)) if binding.context.is_some() => binding.display,
            _ => Handle::NONE,
        }
    }
}

/// All thread states of one driver.
#[derive(Default)]
pub(crate) struct ThreadTable {
    states: FnvHashMap<ThreadKey, ThreadState>,
}

impl ThreadTable {
    pub(crate) fn new() -> ThreadTable {
        ThreadTable::default()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn get(&self, key: ThreadKey) -> Option<&ThreadState> {
        self.states.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: ThreadKey) -> Option<&mut ThreadState> {
        self.states.get_mut(&key)
    }

    pub(crate) fn remove(&mut self, key: ThreadKey) -> Option<ThreadState> {
        self.states.remove(&key)
    }

    pub(crate) fn drain(&mut self) -> Vec<ThreadState> {
        self.states.drain().map(|(_, state)| state).collect()
    }

    /// Makes sure `key` has a thread state.
    ///
    /// `registered` tells whether the calling OS thread already owns the entry under `key`. If
    /// it does not and an entry exists, that entry belongs to a dead thread that presented the
    /// same identity: its bindings are unwound and it is replaced.
    pub(crate) fn get_or_create(
        &mut self,
        state: &mut DriverState,
        key: ThreadKey,
        registered: bool,
        default_api: Option<ClientApi>,
    ) -> Result<&mut ThreadState, Error> {
        if !registered {
            if let Some(mut stale) = self.states.remove(&key) {
                debug!("Recovering stale thread state for {:?}", key);
                state.unbind_thread(&mut stale);
            }
        }

        if !self.states.contains_key(&key) {
            self.states.try_reserve(1).map_err(|_| Error::BadAlloc)?;
            self.states.insert(key, ThreadState::new(key, default_api));
        }

        let tstate = self.states.get_mut(&key).ok_or(Error::BadAlloc)?;
        if tstate.current_sync.is_none() && state.displays_open > 0 {
            tstate.current_sync = Some(state.new_sync_node());
        }
        Ok(tstate)
    }
}

impl DriverState {
    /// Selects the client API subsequent calls on this thread apply to.
    ///
    /// The API being switched away from is made not current at its backend, and whatever the
    /// new API has bound is made current again.
    pub(crate) fn bind_api(&mut self, tstate: &mut ThreadState, api: EGLenum) -> Result<(), Error> {
        let api = ClientApi::from_enum(api)
            .filter(|&api| self.backends.is_installed(api))
            .ok_or(Error::BadParameter)?;
        if tstate.api == Some(api) {
            return Ok(());
        }

        if let Some(sibling) = self.backends.get_mut(api.sibling()) {
            sibling.make_not_current(tstate.key);
        }
        tstate.api = Some(api);

        let binding = match tstate.binding(api) {
            Some(binding) => *binding,
            None => return Ok(()),
        };
        let (ctx, draw, read) = match (binding.context, binding.draw, binding.read) {
            (Some(ctx), Some(draw), Some(read)) => (ctx, draw, read),
            _ => return Ok(()),
        };
        let (context, config, draw, read) =
            self.bind_parts(binding.display, ctx, draw, read).ok_or(Error::BadAlloc)?;
        let target = BindTarget { context, config: &config, draw, read };
        let backend = self.backends.get_mut(api).ok_or(Error::BadAlloc)?;
        backend.make_current(&target, tstate.key).map_err(|_| Error::BadAlloc)
    }

    /// Unbinds everything a thread has bound, the way `make_current` to nothing would for each
    /// client API. A backend refusing to switch back to an API is logged; the binding is
    /// released regardless.
    pub(crate) fn unbind_thread(&mut self, tstate: &mut ThreadState) {
        for &api in ClientApi::ALL.iter() {
            if tstate.binding(api).is_none() {
                continue;
            }
            if let Err(err) = self.bind_api(tstate, api.to_enum()) {
                warn!("Failed to select {:?} for {:?}: {}", api, tstate.key, err);
            }
            self.release_binding(tstate, api);
        }
        tstate.current_sync = None;
    }
}
