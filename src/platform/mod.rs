// egl-runtime/src/platform/mod.rs
//
//! The contract between the driver and the native windowing system.

use crate::egl::EGLint;
use crate::Error;

use euclid::default::Size2D;

pub mod headless;

/// A native display connection, as passed to `get_display`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeDisplay(pub u64);

/// The native display value that asks for the platform's default display.
pub const DEFAULT_DISPLAY: NativeDisplay = NativeDisplay(0);

/// A native window a window surface renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeWindow(pub u64);

/// A native pixmap a pixmap surface renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativePixmap(pub u64);

/// The pixel layout of a native display. Configs are generated to match it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
    Rgba8888,
}

/// Native windowing system services.
///
/// Every call may block and may fail. Implementations must not call back into the driver.
pub trait NativePlatform: Send + Sync {
    /// Resolves `DEFAULT_DISPLAY`. The value may change after the default display is
    /// deinitialized.
    fn default_display(&self) -> NativeDisplay;

    fn display_valid(&self, display: NativeDisplay) -> bool;

    /// Connects the windowing system for a display. Called once per display initialization,
    /// after the GPU device has been opened.
    fn init_display(&self, display: NativeDisplay) -> Result<(), Error>;

    fn deinit_display(&self, display: NativeDisplay);

    fn display_format(&self, display: NativeDisplay) -> PixelFormat;

    fn window_valid(&self, display: NativeDisplay, window: NativeWindow) -> bool;

    /// The window's current size, or `None` if the window is gone.
    fn window_size(&self, display: NativeDisplay, window: NativeWindow) -> Option<Size2D<i32>>;

    fn pixmap_valid(&self, display: NativeDisplay, pixmap: NativePixmap) -> bool {
        self.pixmap_size(display, pixmap).is_some()
    }

    /// The pixmap's size, or `None` if it does not name a valid pixmap.
    fn pixmap_size(&self, display: NativeDisplay, pixmap: NativePixmap) -> Option<Size2D<i32>>;

    /// Whether `pixmap` can take a copy of a color buffer of `size`.
    fn pixmap_copy_compatible(&self, display: NativeDisplay, pixmap: NativePixmap, size: Size2D<i32>) -> bool {
        self.pixmap_size(display, pixmap) == Some(size)
    }

    /// Blocks until native rendering issued through `engine` has finished.
    fn wait_native(&self, _engine: EGLint) -> Result<(), Error> {
        Ok(())
    }

    fn supports_vsync(&self) -> bool;

    /// Opens the shared GPU device. The driver calls this only when no display has it open.
    fn open_device(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Closes the shared GPU device once the last display using it is released.
    fn close_device(&self) {}
}
