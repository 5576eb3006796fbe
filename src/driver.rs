// egl-runtime/src/driver.rs
//
//! The driver instance and its entrypoints.
//!
//! All state lives in a `Driver`: the display and image tables under the main lock, and the
//! per-thread binding states under the thread-table lock. Every entrypoint takes both locks in
//! that order, finds or creates the calling thread's state, runs, and leaves its outcome as the
//! thread's pending error.

use crate::backend::{Backends, ClientApi, RenderingBackend};
use crate::display::{self, Display};
use crate::egl::{self, EGLenum, EGLint};
use crate::error::result_code;
use crate::handle::{Handle, HandleTable, HandleType, MAX_TABLE_CAPACITY};
use crate::image::Image;
use crate::lock::{LockLevel, OrderedMutex};
use crate::platform::{NativeDisplay, NativePixmap, NativePlatform, NativeWindow};
use crate::thread::{SyncNode, ThreadIdentity, ThreadKey, ThreadState, ThreadTable};
use crate::Error;

use fnv::FnvHashMap;
use log::debug;
use std::cell::RefCell;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_DRIVER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Which thread-table entry this OS thread owns, per driver.
    static REGISTRATIONS: RefCell<FnvHashMap<u64, ThreadKey>> = RefCell::new(FnvHashMap::default());
}

// The TLS may already be gone while a thread is exiting. Treat that as "not registered".
fn registration(driver: u64) -> Option<ThreadKey> {
    REGISTRATIONS
        .try_with(|registrations| registrations.borrow().get(&driver).cloned())
        .ok()
        .flatten()
}

fn register(driver: u64, key: ThreadKey) {
    let _ = REGISTRATIONS.try_with(|registrations| {
        registrations.borrow_mut().insert(driver, key);
    });
}

fn forget_registration(driver: u64) {
    let _ = REGISTRATIONS.try_with(|registrations| {
        registrations.borrow_mut().remove(&driver);
    });
}

/// Runtime options of a driver.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Capacity of each handle table.
    pub table_capacity: usize,
    /// The client API new threads start with. Falls back to the first installed API.
    pub default_api: Option<ClientApi>,
    pub thread_identity: ThreadIdentity,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            table_capacity: 4096,
            default_api: Some(ClientApi::OpenGlEs),
            thread_identity: ThreadIdentity::Os,
        }
    }
}

/// The state guarded by the main lock.
pub(crate) struct DriverState {
    pub(crate) displays: HandleTable<Display>,
    pub(crate) images: HandleTable<Image>,
    /// Initialized displays holding the GPU device open.
    pub(crate) displays_open: u32,
    pub(crate) platform: Arc<dyn NativePlatform>,
    pub(crate) backends: Backends,
    pub(crate) table_capacity: usize,
    next_sync_node: u64,
}

impl DriverState {
    pub(crate) fn new_sync_node(&mut self) -> SyncNode {
        self.next_sync_node += 1;
        SyncNode { id: self.next_sync_node, frames: 0 }
    }
}

/// Builds a `Driver`.
pub struct DriverBuilder {
    platform: Arc<dyn NativePlatform>,
    backends: Backends,
    config: DriverConfig,
}

impl DriverBuilder {
    pub fn backend(mut self, api: ClientApi, backend: Box<dyn RenderingBackend>) -> DriverBuilder {
        self.backends.install(api, backend);
        self
    }

    pub fn table_capacity(mut self, capacity: usize) -> DriverBuilder {
        self.config.table_capacity = capacity;
        self
    }

    pub fn default_api(mut self, api: ClientApi) -> DriverBuilder {
        self.config.default_api = Some(api);
        self
    }

    pub fn thread_identity(mut self, identity: ThreadIdentity) -> DriverBuilder {
        self.config.thread_identity = identity;
        self
    }

    pub fn build(self) -> Driver {
        Driver::new(self.platform, self.backends, self.config)
    }
}

/// One EGL implementation instance.
pub struct Driver {
    id: u64,
    identity: ThreadIdentity,
    default_api: Option<ClientApi>,
    pub(crate) state: OrderedMutex<DriverState>,
    pub(crate) threads: OrderedMutex<ThreadTable>,
}

impl Driver {
    pub fn builder(platform: Arc<dyn NativePlatform>) -> DriverBuilder {
        DriverBuilder { platform, backends: Backends::new(), config: DriverConfig::default() }
    }

    pub fn new(platform: Arc<dyn NativePlatform>, backends: Backends, config: DriverConfig) -> Driver {
        let default_api = config
            .default_api
            .filter(|&api| backends.is_installed(api))
            .or_else(|| ClientApi::ALL.iter().cloned().find(|&api| backends.is_installed(api)));
        let capacity = config.table_capacity.min(MAX_TABLE_CAPACITY);

        let state = DriverState {
            displays: HandleTable::new(HandleType::Display, capacity),
            images: HandleTable::new(HandleType::Image, capacity),
            displays_open: 0,
            platform,
            backends,
            table_capacity: capacity,
            next_sync_node: 0,
        };
        Driver {
            id: NEXT_DRIVER_ID.fetch_add(1, Ordering::Relaxed),
            identity: config.thread_identity,
            default_api,
            state: OrderedMutex::new(LockLevel::Main, state),
            threads: OrderedMutex::new(LockLevel::ThreadTable, ThreadTable::new()),
        }
    }

    /// The key the calling thread's state is (or would be) stored under.
    pub fn thread_key(&self) -> ThreadKey {
        registration(self.id).unwrap_or_else(|| self.identity.current())
    }

    // Must be called with both locks held.
    fn attach(&self, state: &mut DriverState, threads: &mut ThreadTable) -> Result<ThreadKey, Error> {
        let registered = registration(self.id);
        let key = registered.unwrap_or_else(|| self.identity.current());
        threads.get_or_create(state, key, registered.is_some(), self.default_api)?;
        if registered.is_none() {
            register(self.id, key);
        }
        Ok(key)
    }

    fn with_thread<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut DriverState, &mut ThreadState) -> Result<T, Error>,
    {
        let mut state = self.state.lock();
        let mut threads = self.threads.lock();
        let key = self.attach(&mut state, &mut threads)?;
        let tstate = threads.get_mut(key).ok_or(Error::BadAlloc)?;
        let result = f(&mut state, tstate);
        tstate.error = result_code(&result);
        result
    }

    fn release_thread_state(&self, state: &mut DriverState, threads: &mut ThreadTable, key: ThreadKey) {
        if let Some(mut tstate) = threads.remove(key) {
            state.unbind_thread(&mut tstate);
            debug!("Released thread state {:?} ({} left)", key, threads.len());
        }
        forget_registration(self.id);
    }

    /// Returns and clears the calling thread's pending error.
    pub fn get_error(&self) -> EGLint {
        let mut state = self.state.lock();
        let mut threads = self.threads.lock();
        let key = match self.attach(&mut state, &mut threads) {
            Ok(key) => key,
            Err(err) => return err.code(),
        };
        match threads.get_mut(key) {
            Some(tstate) => mem::replace(&mut tstate.error, egl::SUCCESS),
            None => egl::BAD_ALLOC,
        }
    }

    // Displays

    /// Returns the display for a native display, registering it on first use. Returns
    /// `Handle::NONE` if the platform does not know the native display.
    pub fn get_display(&self, native: NativeDisplay) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.get_display(native))
    }

    /// Returns the EGL version as `(major, minor)`.
    pub fn initialize(&self, dpy: Handle) -> Result<(EGLint, EGLint), Error> {
        self.with_thread(|state, _| state.initialize(dpy))
    }

    pub fn terminate(&self, dpy: Handle) -> Result<(), Error> {
        let mut state = self.state.lock();
        let mut threads = self.threads.lock();
        let key = self.attach(&mut state, &mut threads)?;
        let result = state.terminate(dpy, key);
        if let Some(tstate) = threads.get_mut(key) {
            tstate.error = result_code(&result);
        }
        if let Ok(true) = result {
            self.release_thread_state(&mut state, &mut threads, key);
        }
        result.map(|_| ())
    }

    pub fn query_string(&self, dpy: Handle, name: EGLint) -> Result<&'static str, Error> {
        self.with_thread(|state, _| state.query_string(dpy, name))
    }

    pub fn get_configs(&self, dpy: Handle) -> Result<Vec<Handle>, Error> {
        self.with_thread(|state, _| state.get_configs(dpy))
    }

    pub fn choose_config(&self, dpy: Handle, attribs: &[EGLint]) -> Result<Vec<Handle>, Error> {
        self.with_thread(|state, _| state.choose_config(dpy, attribs))
    }

    pub fn get_config_attrib(&self, dpy: Handle, config: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.with_thread(|state, _| state.get_config_attrib(dpy, config, attribute))
    }

    /// Marks every context of a display lost, as after a power management event.
    pub fn lose_contexts(&self, dpy: Handle) -> Result<usize, Error> {
        self.state.lock().lose_contexts(dpy)
    }

    /// Unbinds every thread and frees every display. The driver stays usable: displays can be
    /// registered again.
    pub fn free_all_displays(&self) {
        let mut state = self.state.lock();
        let mut threads = self.threads.lock();
        let thread = self.thread_key();
        display::free_all_displays(&mut state, &mut threads, thread);
        forget_registration(self.id);
    }

    // Threads

    pub fn bind_api(&self, api: EGLenum) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.bind_api(tstate, api))
    }

    pub fn query_api(&self) -> EGLenum {
        self.with_thread(|_, tstate| Ok(tstate.query_api()))
            .unwrap_or(egl::NONE as EGLenum)
    }

    /// Unbinds everything the calling thread has bound and drops its state.
    pub fn release_thread(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        let mut threads = self.threads.lock();
        let key = match registration(self.id) {
            Some(key) => key,
            None => return Ok(()),
        };
        self.release_thread_state(&mut state, &mut threads, key);
        Ok(())
    }

    pub fn get_current_context(&self) -> Result<Handle, Error> {
        self.with_thread(|_, tstate| Ok(tstate.current_context()))
    }

    /// `which` is `egl::DRAW` or `egl::READ`.
    pub fn get_current_surface(&self, which: EGLint) -> Result<Handle, Error> {
        self.with_thread(|_, tstate| tstate.current_surface(which))
    }

    pub fn get_current_display(&self) -> Result<Handle, Error> {
        self.with_thread(|_, tstate| Ok(tstate.current_display()))
    }

    // Contexts

    pub fn create_context(
        &self,
        dpy: Handle,
        config: Handle,
        share: Handle,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        self.with_thread(|state, tstate| state.create_context(tstate, dpy, config, share, attribs))
    }

    pub fn destroy_context(&self, dpy: Handle, ctx: Handle) -> Result<(), Error> {
        self.with_thread(|state, tstate| {
            let key = tstate.key;
            state.destroy_context(Some(tstate), dpy, ctx, key)
        })
    }

    pub fn query_context(&self, dpy: Handle, ctx: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.with_thread(|state, _| state.query_context(dpy, ctx, attribute))
    }

    pub fn make_current(&self, dpy: Handle, draw: Handle, read: Handle, ctx: Handle) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.make_current(tstate, dpy, draw, read, ctx))
    }

    // Surfaces

    pub fn create_window_surface(
        &self,
        dpy: Handle,
        config: Handle,
        window: NativeWindow,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.create_window_surface(dpy, config, window, attribs))
    }

    pub fn create_pixmap_surface(
        &self,
        dpy: Handle,
        config: Handle,
        pixmap: NativePixmap,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.create_pixmap_surface(dpy, config, pixmap, attribs))
    }

    pub fn create_pbuffer_surface(&self, dpy: Handle, config: Handle, attribs: &[EGLint]) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.create_pbuffer_surface(dpy, config, attribs))
    }

    /// Creates a pbuffer around an OpenVG image. An OpenVG context must be current to the
    /// calling thread; `buffer` names one of its images.
    pub fn create_pbuffer_from_client_buffer(
        &self,
        dpy: Handle,
        buffer_type: EGLenum,
        buffer: u64,
        config: Handle,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        self.with_thread(|state, tstate| {
            state.create_pbuffer_from_client_buffer(tstate, dpy, buffer_type, buffer, config, attribs)
        })
    }

    pub fn destroy_surface(&self, dpy: Handle, surface: Handle) -> Result<(), Error> {
        self.with_thread(|state, _| state.destroy_surface(dpy, surface))
    }

    pub fn query_surface(&self, dpy: Handle, surface: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.with_thread(|state, _| state.query_surface(dpy, surface, attribute))
    }

    pub fn surface_attrib(&self, dpy: Handle, surface: Handle, attribute: EGLint, value: EGLint) -> Result<(), Error> {
        self.with_thread(|state, _| state.surface_attrib(dpy, surface, attribute, value))
    }

    pub fn swap_buffers(&self, dpy: Handle, surface: Handle) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.swap_buffers(tstate, dpy, surface))
    }

    pub fn swap_interval(&self, dpy: Handle, interval: EGLint) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.swap_interval(tstate, dpy, interval))
    }

    pub fn bind_tex_image(&self, dpy: Handle, surface: Handle, buffer: EGLint) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.bind_tex_image(tstate, dpy, surface, buffer))
    }

    pub fn release_tex_image(&self, dpy: Handle, surface: Handle, buffer: EGLint) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.release_tex_image(tstate, dpy, surface, buffer))
    }

    pub fn copy_buffers(&self, dpy: Handle, surface: Handle, target: NativePixmap) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.copy_buffers(tstate, dpy, surface, target))
    }

    // Synchronization with native rendering

    pub fn wait_client(&self) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.wait_client(tstate))
    }

    pub fn wait_gl(&self) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.wait_gl(tstate))
    }

    /// `engine` must be `egl::CORE_NATIVE_ENGINE`.
    pub fn wait_native(&self, engine: EGLint) -> Result<(), Error> {
        self.with_thread(|state, tstate| state.wait_native(tstate, engine))
    }

    // Images

    /// `buffer` is a native pixmap id for `NATIVE_PIXMAP_KHR`, a texture name for
    /// `GL_TEXTURE_2D_KHR`.
    pub fn create_image(
        &self,
        dpy: Handle,
        ctx: Handle,
        target: EGLenum,
        buffer: u64,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.create_image(dpy, ctx, target, buffer, attribs))
    }

    pub fn destroy_image(&self, dpy: Handle, image: Handle) -> Result<(), Error> {
        self.with_thread(|state, _| state.destroy_image(dpy, image))
    }

    // Sync objects

    pub fn create_sync(&self, dpy: Handle, kind: EGLenum, attribs: &[EGLint]) -> Result<Handle, Error> {
        self.with_thread(|state, _| state.create_sync(dpy, kind, attribs))
    }

    pub fn destroy_sync(&self, dpy: Handle, sync: Handle) -> Result<(), Error> {
        self.with_thread(|state, _| state.destroy_sync(dpy, sync))
    }

    pub fn signal_sync(&self, dpy: Handle, sync: Handle, mode: EGLint) -> Result<(), Error> {
        self.with_thread(|state, _| state.signal_sync(dpy, sync, mode))
    }

    pub fn get_sync_attrib(&self, dpy: Handle, sync: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.with_thread(|state, _| state.get_sync_attrib(dpy, sync, attribute))
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.free_all_displays();
    }
}
