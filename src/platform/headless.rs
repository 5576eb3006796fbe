// egl-runtime/src/platform/headless.rs
//
//! An in-memory windowing system.
//!
//! Windows and pixmaps are plain records, displays are numbers. Useful for headless rendering
//! and for exercising the driver's lifecycle logic, since every native failure can be scripted.

use super::{NativeDisplay, NativePixmap, NativePlatform, NativeWindow, PixelFormat};
use crate::egl::EGLint;
use crate::Error;

use euclid::default::Size2D;
use fnv::{FnvHashMap, FnvHashSet};
use log::debug;
use std::sync::{Mutex, MutexGuard};

struct HeadlessState {
    default_display: NativeDisplay,
    displays: FnvHashSet<NativeDisplay>,
    initialized: FnvHashMap<NativeDisplay, u32>,
    windows: FnvHashMap<NativeWindow, Size2D<i32>>,
    pixmaps: FnvHashMap<NativePixmap, Size2D<i32>>,
    next_native_id: u64,
    format: PixelFormat,
    vsync: bool,
    device_open: bool,
    device_opens: u32,
    fail_next_device_open: bool,
    fail_next_init: bool,
    native_waits: u32,
    fail_next_wait_native: bool,
}

/// A scriptable `NativePlatform` with no windowing system behind it.
pub struct HeadlessPlatform {
    state: Mutex<HeadlessState>,
}

impl Default for HeadlessPlatform {
    fn default() -> HeadlessPlatform {
        HeadlessPlatform::new()
    }
}

impl HeadlessPlatform {
    pub fn new() -> HeadlessPlatform {
        let default_display = NativeDisplay(1);
        let mut displays = FnvHashSet::default();
        displays.insert(default_display);
        HeadlessPlatform {
            state: Mutex::new(HeadlessState {
                default_display,
                displays,
                initialized: FnvHashMap::default(),
                windows: FnvHashMap::default(),
                pixmaps: FnvHashMap::default(),
                next_native_id: 0x100,
                format: PixelFormat::Rgba8888,
                vsync: true,
                device_open: false,
                device_opens: 0,
                fail_next_device_open: false,
                fail_next_init: false,
                native_waits: 0,
                fail_next_wait_native: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<HeadlessState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Registers another valid native display.
    pub fn add_display(&self, display: NativeDisplay) {
        self.lock().displays.insert(display);
    }

    pub fn remove_display(&self, display: NativeDisplay) {
        self.lock().displays.remove(&display);
    }

    /// Changes what `DEFAULT_DISPLAY` resolves to. The new value becomes a valid display.
    pub fn set_default_display(&self, display: NativeDisplay) {
        let mut state = self.lock();
        state.default_display = display;
        state.displays.insert(display);
    }

    pub fn create_window(&self, size: Size2D<i32>) -> NativeWindow {
        let mut state = self.lock();
        state.next_native_id += 1;
        let window = NativeWindow(state.next_native_id);
        state.windows.insert(window, size);
        window
    }

    /// Destroys a window behind the driver's back, the way a window manager would.
    pub fn destroy_window(&self, window: NativeWindow) {
        self.lock().windows.remove(&window);
    }

    pub fn resize_window(&self, window: NativeWindow, size: Size2D<i32>) {
        if let Some(window_size) = self.lock().windows.get_mut(&window) {
            *window_size = size;
        }
    }

    pub fn create_pixmap(&self, size: Size2D<i32>) -> NativePixmap {
        let mut state = self.lock();
        state.next_native_id += 1;
        let pixmap = NativePixmap(state.next_native_id);
        state.pixmaps.insert(pixmap, size);
        pixmap
    }

    pub fn set_format(&self, format: PixelFormat) {
        self.lock().format = format;
    }

    pub fn set_vsync(&self, vsync: bool) {
        self.lock().vsync = vsync;
    }

    /// Makes the next `open_device` call fail with `BadAlloc`.
    pub fn fail_next_device_open(&self) {
        self.lock().fail_next_device_open = true;
    }

    /// Makes the next `init_display` call fail with `BadAlloc`.
    pub fn fail_next_init(&self) {
        self.lock().fail_next_init = true;
    }

    /// Makes the next `wait_native` call fail with `BadAlloc`.
    pub fn fail_next_wait_native(&self) {
        self.lock().fail_next_wait_native = true;
    }

    /// How many times the driver waited for native rendering.
    pub fn native_waits(&self) -> u32 {
        self.lock().native_waits
    }

    pub fn is_device_open(&self) -> bool {
        self.lock().device_open
    }

    /// How many times the device has been opened so far.
    pub fn device_open_count(&self) -> u32 {
        self.lock().device_opens
    }

    /// How many init calls on `display` have not been balanced by a deinit.
    pub fn init_count(&self, display: NativeDisplay) -> u32 {
        self.lock().initialized.get(&display).cloned().unwrap_or(0)
    }
}

impl NativePlatform for HeadlessPlatform {
    fn default_display(&self) -> NativeDisplay {
        self.lock().default_display
    }

    fn display_valid(&self, display: NativeDisplay) -> bool {
        self.lock().displays.contains(&display)
    }

    fn init_display(&self, display: NativeDisplay) -> Result<(), Error> {
        let mut state = self.lock();
        if state.fail_next_init {
            state.fail_next_init = false;
            return Err(Error::BadAlloc);
        }
        *state.initialized.entry(display).or_insert(0) += 1;
        Ok(())
    }

    fn deinit_display(&self, display: NativeDisplay) {
        let mut state = self.lock();
        if let Some(count) = state.initialized.get_mut(&display) {
            *count -= 1;
            if *count == 0 {
                state.initialized.remove(&display);
            }
        }
    }

    fn display_format(&self, _: NativeDisplay) -> PixelFormat {
        self.lock().format
    }

    fn window_valid(&self, _: NativeDisplay, window: NativeWindow) -> bool {
        self.lock().windows.contains_key(&window)
    }

    fn window_size(&self, _: NativeDisplay, window: NativeWindow) -> Option<Size2D<i32>> {
        self.lock().windows.get(&window).cloned()
    }

    fn pixmap_size(&self, _: NativeDisplay, pixmap: NativePixmap) -> Option<Size2D<i32>> {
        self.lock().pixmaps.get(&pixmap).cloned()
    }

    fn wait_native(&self, _: EGLint) -> Result<(), Error> {
        let mut state = self.lock();
        if state.fail_next_wait_native {
            state.fail_next_wait_native = false;
            return Err(Error::BadAlloc);
        }
        state.native_waits += 1;
        Ok(())
    }

    fn supports_vsync(&self) -> bool {
        self.lock().vsync
    }

    fn open_device(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.fail_next_device_open {
            state.fail_next_device_open = false;
            return Err(Error::BadAlloc);
        }
        debug_assert!(!state.device_open, "device opened twice");
        debug!("Opening headless device");
        state.device_open = true;
        state.device_opens += 1;
        Ok(())
    }

    fn close_device(&self) {
        debug!("Closing headless device");
        self.lock().device_open = false;
    }
}
