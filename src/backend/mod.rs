// egl-runtime/src/backend/mod.rs
//
//! The client API backends contexts are created on and bound through.
//!
//! The driver never looks inside a backend context. A thread binding records which client API
//! it belongs to, and every backend call is dispatched through `Backends` by that API.

use crate::config::Config;
use crate::egl::{self, EGLenum, EGLint};
use crate::handle::Handle;
use crate::platform::NativePixmap;
use crate::surface::SurfaceKind;
use crate::thread::ThreadKey;
use crate::Error;

use euclid::default::Size2D;

pub mod headless;

/// A rendering API a context can be created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientApi {
    /// OpenGL ES 1.x and 2.x.
    OpenGlEs,
    /// OpenVG.
    OpenVg,
}

impl ClientApi {
    pub const ALL: [ClientApi; 2] = [ClientApi::OpenGlEs, ClientApi::OpenVg];

    pub fn from_enum(api: EGLenum) -> Option<ClientApi> {
        match api {
            egl::OPENGL_ES_API => Some(ClientApi::OpenGlEs),
            egl::OPENVG_API => Some(ClientApi::OpenVg),
            _ => None,
        }
    }

    #[inline]
    pub fn to_enum(self) -> EGLenum {
        match self {
            ClientApi::OpenGlEs => egl::OPENGL_ES_API,
            ClientApi::OpenVg => egl::OPENVG_API,
        }
    }

    /// The API the other binding slot of a thread belongs to.
    #[inline]
    pub fn sibling(self) -> ClientApi {
        match self {
            ClientApi::OpenGlEs => ClientApi::OpenVg,
            ClientApi::OpenVg => ClientApi::OpenGlEs,
        }
    }
}

/// A backend's name for one of its contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ApiContext(pub u64);

/// Robustness settings from `EGL_EXT_create_context_robustness`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Robustness {
    pub robust_access: bool,
    pub reset_notification_strategy: EGLint,
}

impl Default for Robustness {
    fn default() -> Robustness {
        Robustness {
            robust_access: false,
            reset_notification_strategy: egl::NO_RESET_NOTIFICATION_EXT,
        }
    }
}

/// Everything a backend needs to create a context.
pub struct ContextRequest<'a> {
    pub config: &'a Config,
    pub share: Option<ApiContext>,
    pub client_version: EGLint,
    pub robustness: Robustness,
}

/// A surface as seen by a backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDesc {
    pub surface: Handle,
    pub kind: SurfaceKind,
    pub size: Size2D<i32>,
}

/// The triple a backend binds to a thread.
pub struct BindTarget<'a> {
    pub context: ApiContext,
    pub config: &'a Config,
    pub draw: SurfaceDesc,
    pub read: SurfaceDesc,
}

/// Operations the driver needs from a client API implementation.
///
/// All methods are called with the driver's main lock held.
pub trait RenderingBackend: Send {
    fn create_context(&mut self, request: &ContextRequest) -> Result<ApiContext, Error>;

    /// Frees a context. Called exactly once, after the last reference to it went away.
    fn release_context(&mut self, context: ApiContext, thread: ThreadKey);

    /// Binds a context and its surfaces to `thread`.
    fn make_current(&mut self, target: &BindTarget, thread: ThreadKey) -> Result<(), Error>;

    /// Suspends whatever this API has bound to `thread`, without dropping the binding.
    fn make_not_current(&mut self, thread: ThreadKey);

    /// Detaches the frame builder of the context bound to `thread`, ahead of an unbind.
    fn remove_frame_builder(&mut self, thread: ThreadKey);

    fn bind_tex_image(&mut self, _surface: &SurfaceDesc, _thread: ThreadKey) -> Result<(), Error> {
        Ok(())
    }

    fn release_tex_image(&mut self, _surface: &SurfaceDesc, _thread: ThreadKey) {}

    /// Resolves a client buffer (an OpenVG image) that a pbuffer is about to wrap, returning
    /// its size. `BadParameter` if `context` knows no such buffer, `BadMatch` if its layout
    /// does not fit `config`.
    fn client_buffer_size(
        &mut self,
        _context: ApiContext,
        _buffer: u64,
        _config: &Config,
    ) -> Result<Size2D<i32>, Error> {
        Err(Error::BadParameter)
    }

    /// Pushes what `thread` rendered to a client buffer pbuffer back into the buffer.
    fn flush_to_client_buffer(&mut self, _surface: &SurfaceDesc, _thread: ThreadKey) -> Result<(), Error> {
        Ok(())
    }

    /// Resolves `surface`'s color buffer into a native pixmap, blocking until the copy is done.
    fn copy_to_pixmap(&mut self, _surface: &SurfaceDesc, _pixmap: NativePixmap, _thread: ThreadKey) -> Result<(), Error> {
        Ok(())
    }
}

/// The installed backends, at most one per client API.
#[derive(Default)]
pub struct Backends {
    gles: Option<Box<dyn RenderingBackend>>,
    vg: Option<Box<dyn RenderingBackend>>,
}

impl Backends {
    pub fn new() -> Backends {
        Backends::default()
    }

    pub fn install(&mut self, api: ClientApi, backend: Box<dyn RenderingBackend>) {
        *self.slot(api) = Some(backend);
    }

    #[inline]
    pub fn is_installed(&self, api: ClientApi) -> bool {
        match api {
            ClientApi::OpenGlEs => self.gles.is_some(),
            ClientApi::OpenVg => self.vg.is_some(),
        }
    }

    pub(crate) fn get_mut(&mut self, api: ClientApi) -> Option<&mut (dyn RenderingBackend + 'static)> {
        self.slot(api).as_deref_mut()
    }

    fn slot(&mut self, api: ClientApi) -> &mut Option<Box<dyn RenderingBackend>> {
        match api {
            ClientApi::OpenGlEs => &mut self.gles,
            ClientApi::OpenVg => &mut self.vg,
        }
    }
}
