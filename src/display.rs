// egl-runtime/src/display.rs
//
//! Display connections and their lifecycle.
//!
//! A display moves through three states once registered: uninitialized, ready (INITIALIZED),
//! and draining (INITIALIZED | TERMINATING). Draining ends when the last surface, context and
//! image of the display is gone, either at the end of `terminate` itself or on the unbind that
//! drops the last reference.
//!
//! Initializing the first display opens the shared GPU device; releasing the last initialized
//! display closes it again.

use crate::backend::ClientApi;
use crate::config::{self, Config};
use crate::driver::DriverState;
use crate::egl::{self, EGLint};
use crate::handle::{self, DisplayTables, Handle};
use crate::platform::{NativeDisplay, PixelFormat, DEFAULT_DISPLAY};
use crate::thread::{ThreadKey, ThreadTable};
use crate::Error;

use bitflags::bitflags;
use log::{debug, warn};
use std::sync::Arc;

bitflags! {
    /// Lifecycle flags of a display. `TERMINATING` is never set without `INITIALIZED`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DisplayFlags: u8 {
        const INITIALIZED = 0x01;
        const TERMINATING = 0x02;
    }
}

/// The EGL version every initialized display reports.
pub const EGL_VERSION: (EGLint, EGLint) = (1, 4);

const VENDOR: &str = "egl-runtime";
const VERSION: &str = concat!("1.4 egl-runtime ", env!("CARGO_PKG_VERSION"));
const EXTENSIONS: &str = "EGL_KHR_image_base EGL_KHR_image_pixmap EGL_KHR_reusable_sync";
const EXTENSIONS_GLES: &str = "EGL_KHR_image_base EGL_KHR_image_pixmap EGL_KHR_gl_texture_2D_image \
                               EGL_KHR_reusable_sync EGL_EXT_create_context_robustness";

pub(crate) struct Display {
    pub(crate) native: NativeDisplay,
    /// Created from `DEFAULT_DISPLAY`. The native value is re-resolved on initialize.
    pub(crate) default_display: bool,
    pub(crate) flags: DisplayFlags,
    pub(crate) format: Option<PixelFormat>,
    pub(crate) tables: Option<DisplayTables>,
}

impl Display {
    fn new(native: NativeDisplay, default_display: bool) -> Display {
        Display { native, default_display, flags: DisplayFlags::empty(), format: None, tables: None }
    }

    #[inline]
    pub(crate) fn is_initialized(&self) -> bool {
        self.flags.contains(DisplayFlags::INITIALIZED)
    }

    #[inline]
    pub(crate) fn is_terminating(&self) -> bool {
        self.flags.contains(DisplayFlags::TERMINATING)
    }
}

impl DriverState {
    pub(crate) fn get_display(&mut self, native: NativeDisplay) -> Result<Handle, Error> {
        let default_display = native == DEFAULT_DISPLAY;
        let native = if default_display { self.platform.default_display() } else { native };
        if !self.platform.display_valid(native) {
            debug!("Native display {:?} is not valid", native);
            return Ok(Handle::NONE);
        }

        // One display per native display, however it was named.
        if let Some(existing) = self.displays.find(|display| display.native == native) {
            return Ok(existing);
        }

        let handle = self.displays.insert(Display::new(native, default_display))?;
        debug!("Registered display {:?} for {:?}", handle, native);
        Ok(handle)
    }

    pub(crate) fn initialize(&mut self, dpy: Handle) -> Result<(EGLint, EGLint), Error> {
        let (initialized, default_display) = {
            let display = self.check_display(dpy)?;
            (display.is_initialized(), display.default_display)
        };

        let mut opened_device = false;
        if !initialized {
            self.open_device()?;
            opened_device = true;
        }
        if default_display && !initialized {
            let native = self.platform.default_display();
            self.check_display_mut(dpy)?.native = native;
        }

        let native = self.check_display(dpy)?.native;
        if !self.platform.display_valid(native) {
            if opened_device {
                self.close_device();
            }
            return Err(Error::BadDisplay);
        }

        if !initialized {
            if let Err(err) = self.platform.init_display(native) {
                debug!("Platform refused to initialize {:?}: {}", native, err);
                self.close_device();
                return Err(Error::BadAlloc);
            }

            let capacity = self.table_capacity;
            let format = self.platform.display_format(native);
            let display = self.check_display_mut(dpy)?;
            handle::create_handle_tables(display, capacity);
            display.format = Some(format);

            if let Err(err) = self.insert_configs(dpy, format) {
                self.remove_display(dpy, false);
                if let Ok(display) = self.check_display_mut(dpy) {
                    display.format = None;
                }
                self.platform.deinit_display(native);
                self.close_device();
                return Err(err);
            }
        }

        let display = self.check_display_mut(dpy)?;
        display.flags.insert(DisplayFlags::INITIALIZED);
        display.flags.remove(DisplayFlags::TERMINATING);
        if !initialized {
            debug!("Initialized display {:?}", dpy);
        }
        Ok(EGL_VERSION)
    }

    fn insert_configs(&mut self, dpy: Handle, format: PixelFormat) -> Result<(), Error> {
        let tables = self.tables_mut(dpy).ok_or(Error::BadAlloc)?;
        for config in config::generate_configs(format) {
            tables.configs.insert(Arc::new(config))?;
        }
        Ok(())
    }

    /// Starts tearing down a display. Everything not bound to a thread is released now.
    ///
    /// Returns `true` if the display was fully released, in which case the caller releases the
    /// calling thread's state too.
    pub(crate) fn terminate(&mut self, dpy: Handle, thread: ThreadKey) -> Result<bool, Error> {
        let display = self.check_display_mut(dpy)?;
        if !display.is_initialized() || display.is_terminating() {
            return Ok(false);
        }
        display.flags.insert(DisplayFlags::TERMINATING);
        debug!("Terminating display {:?}", dpy);

        self.release_surface_handles(dpy);
        self.release_context_handles(dpy, thread);
        self.release_unbound_images(dpy);
        self.release_sync_handles(dpy);

        Ok(self.complete_termination(dpy))
    }

    /// Fully releases a draining display that has nothing left. Returns `true` if it did.
    pub(crate) fn complete_termination(&mut self, dpy: Handle) -> bool {
        if !self.displays.get(dpy).map_or(false, |display| display.is_terminating()) {
            return false;
        }
        self.release_unbound_images(dpy);

        let drained = match self.displays.get(dpy) {
            Some(display) if display.is_terminating() => {
                display.tables.as_ref().map_or(true, |tables| {
                    tables.surfaces.is_empty() && tables.contexts.is_empty()
                })
            }
            _ => false,
        };
        if !drained || self.images_owned(dpy) != 0 {
            return false;
        }
        self.release_display(dpy, false);
        debug!("Display {:?} finished terminating", dpy);
        true
    }

    /// Tears a display down. With `free_display` the display is unregistered; otherwise it
    /// stays registered and uninitialized, ready to be initialized again.
    pub(crate) fn release_display(&mut self, dpy: Handle, free_display: bool) {
        let (native, initialized) = match self.displays.get(dpy) {
            Some(display) => (display.native, display.is_initialized()),
            None => return,
        };

        self.release_image_handles(dpy);
        if initialized {
            self.platform.deinit_display(native);
        }
        self.remove_display(dpy, free_display);
        if !free_display {
            if let Some(display) = self.displays.get_mut(dpy) {
                display.flags = DisplayFlags::empty();
                display.format = None;
            }
        }
        if initialized {
            self.close_device();
        }
        debug!("Released display {:?} (freed: {})", dpy, free_display);
    }

    pub(crate) fn open_device(&mut self) -> Result<(), Error> {
        if self.displays_open == 0 {
            self.platform.open_device().map_err(|err| {
                debug!("Failed to open the GPU device: {}", err);
                Error::BadAlloc
            })?;
        }
        self.displays_open += 1;
        Ok(())
    }

    pub(crate) fn close_device(&mut self) {
        debug_assert!(self.displays_open > 0, "device closed more often than opened");
        self.displays_open = self.displays_open.saturating_sub(1);
        if self.displays_open == 0 {
            self.platform.close_device();
        }
    }

    pub(crate) fn query_string(&self, dpy: Handle, name: EGLint) -> Result<&'static str, Error> {
        self.check_display_ready(dpy)?;
        let gles = self.backends.is_installed(ClientApi::OpenGlEs);
        let vg = self.backends.is_installed(ClientApi::OpenVg);
        match name {
            egl::VENDOR => Ok(VENDOR),
            egl::VERSION => Ok(VERSION),
            egl::EXTENSIONS if gles => Ok(EXTENSIONS_GLES),
            egl::EXTENSIONS => Ok(EXTENSIONS),
            egl::CLIENT_APIS => Ok(match (gles, vg) {
                (true, true) => "OpenGL_ES OpenVG",
                (true, false) => "OpenGL_ES",
                (false, true) => "OpenVG",
                (false, false) => "",
            }),
            _ => Err(Error::BadParameter),
        }
    }

    /// All config handles of a display, in id order.
    pub(crate) fn get_configs(&self, dpy: Handle) -> Result<Vec<Handle>, Error> {
        self.check_display_ready(dpy)?;
        Ok(self.tables(dpy).map(|tables| tables.configs.handles()).unwrap_or_default())
    }

    pub(crate) fn choose_config(&self, dpy: Handle, attribs: &[EGLint]) -> Result<Vec<Handle>, Error> {
        self.check_display_ready(dpy)?;
        match self.tables(dpy) {
            Some(tables) => config::choose_configs(tables.configs.iter(), attribs),
            None => Ok(vec![]),
        }
    }

    pub(crate) fn get_config_attrib(&self, dpy: Handle, config: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.check_display_ready(dpy)?;
        let config: Arc<Config> = self.check_config(dpy, config)?;
        config.attrib(attribute)
    }
}

/// Process teardown. Every thread binding is dropped, then every display is freed along with
/// everything it still owns, current or not.
pub(crate) fn free_all_displays(state: &mut DriverState, threads: &mut ThreadTable, thread: ThreadKey) {
    for mut tstate in threads.drain() {
        state.unbind_thread(&mut tstate);
    }

    for dpy in state.displays.handles() {
        if let Some(tables) = state.tables_mut(dpy) {
            for (_, surface) in tables.surfaces.iter_mut() {
                surface.lifetime.force_unpin();
            }
            for (_, context) in tables.contexts.iter_mut() {
                context.lifetime.force_unpin();
            }
        }
        if !state.release_surface_handles(dpy) || !state.release_context_handles(dpy, thread) {
            warn!("Display {:?} still had referenced objects at teardown", dpy);
        }
        state.release_display(dpy, true);
    }
}
