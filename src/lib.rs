//! EGL display, context and surface lifetime management.
//!
//! This crate implements the state-keeping half of an EGL 1.4 driver: registering and
//! initializing displays, handing out handles to configs, contexts, surfaces, images and sync
//! objects, and binding contexts and surfaces to threads. Rendering itself is delegated to a
//! `RenderingBackend` per client API (OpenGL ES, OpenVG), and the windowing system is reached
//! through a `NativePlatform`. Headless implementations of both are included.
//!
//! Objects that are current to a thread survive being destroyed: the handle stops resolving for
//! new calls, and the object is freed when its last thread unbinds it. Displays likewise keep
//! draining after `terminate` until nothing of theirs is bound any longer.

pub mod backend;
pub use crate::backend::{ApiContext, BindTarget, ClientApi, ContextRequest, RenderingBackend};
pub use crate::backend::{Backends, Robustness, SurfaceDesc};

pub mod config;
pub use crate::config::{ColorBufferType, Config, RenderableType, SurfaceTypeFlags};

pub mod egl;

pub mod error;
pub use crate::error::Error;

pub mod platform;
pub use crate::platform::{NativeDisplay, NativePixmap, NativePlatform, NativeWindow, PixelFormat};

mod context;

mod display;
pub use crate::display::{DisplayFlags, EGL_VERSION};

mod driver;
pub use crate::driver::{Driver, DriverBuilder, DriverConfig};

mod handle;
pub use crate::handle::{Handle, HandleType, MAX_TABLE_CAPACITY};
pub use crate::handle::{ConfigHandle, ContextHandle, DisplayHandle, ImageHandle, SurfaceHandle, SyncHandle};

mod image;
mod lifetime;
mod lock;
mod make_current;

mod surface;
pub use crate::surface::SurfaceKind;

mod sync;

mod thread;
pub use crate::thread::{ThreadIdentity, ThreadKey};

mod wait;

#[cfg(test)]
mod tests;
