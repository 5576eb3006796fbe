// egl-runtime/src/error.rs
//
//! Various errors that entrypoints can produce.

use crate::egl::{self, EGLint};

use std::fmt::{self, Display, Formatter};

/// The EGL errors an entrypoint can report.
///
/// Every failed entrypoint stores exactly one of these as the calling thread's pending error,
/// readable once through `Driver::get_error()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// EGL is not initialized, or could not be initialized, for the specified display, or the
    /// display is being terminated.
    NotInitialized,
    /// A requested resource cannot be accessed, for example a context is current to another
    /// thread.
    BadAccess,
    /// Allocating resources for the requested operation failed.
    BadAlloc,
    /// An unrecognized attribute or attribute value was passed in an attribute list.
    BadAttribute,
    /// A config handle does not name a valid config.
    BadConfig,
    /// A context handle does not name a valid context.
    BadContext,
    /// The current surface of the calling thread is no longer valid.
    BadCurrentSurface,
    /// A display handle does not name a valid display connection.
    BadDisplay,
    /// Arguments are inconsistent, for example a context requires buffers not supplied by a
    /// surface.
    BadMatch,
    /// A native pixmap does not refer to a valid pixmap.
    BadNativePixmap,
    /// A native window does not refer to a valid window.
    BadNativeWindow,
    /// One or more argument values are invalid.
    BadParameter,
    /// A surface handle does not name a valid surface.
    BadSurface,
    /// A power management event has occurred. The application must destroy all contexts and
    /// reinitialise client API state to continue rendering.
    ContextLost,
}

impl Error {
    /// Returns the EGL error code for this error.
    pub fn code(self) -> EGLint {
        match self {
            Error::NotInitialized => egl::NOT_INITIALIZED,
            Error::BadAccess => egl::BAD_ACCESS,
            Error::BadAlloc => egl::BAD_ALLOC,
            Error::BadAttribute => egl::BAD_ATTRIBUTE,
            Error::BadConfig => egl::BAD_CONFIG,
            Error::BadContext => egl::BAD_CONTEXT,
            Error::BadCurrentSurface => egl::BAD_CURRENT_SURFACE,
            Error::BadDisplay => egl::BAD_DISPLAY,
            Error::BadMatch => egl::BAD_MATCH,
            Error::BadNativePixmap => egl::BAD_NATIVE_PIXMAP,
            Error::BadNativeWindow => egl::BAD_NATIVE_WINDOW,
            Error::BadParameter => egl::BAD_PARAMETER,
            Error::BadSurface => egl::BAD_SURFACE,
            Error::ContextLost => egl::CONTEXT_LOST,
        }
    }

    /// Maps an EGL error code back to an error. `SUCCESS` and unknown codes map to `None`.
    pub fn from_code(code: EGLint) -> Option<Error> {
        let error = match code {
            egl::NOT_INITIALIZED => Error::NotInitialized,
            egl::BAD_ACCESS => Error::BadAccess,
            egl::BAD_ALLOC => Error::BadAlloc,
            egl::BAD_ATTRIBUTE => Error::BadAttribute,
            egl::BAD_CONFIG => Error::BadConfig,
            egl::BAD_CONTEXT => Error::BadContext,
            egl::BAD_CURRENT_SURFACE => Error::BadCurrentSurface,
            egl::BAD_DISPLAY => Error::BadDisplay,
            egl::BAD_MATCH => Error::BadMatch,
            egl::BAD_NATIVE_PIXMAP => Error::BadNativePixmap,
            egl::BAD_NATIVE_WINDOW => Error::BadNativeWindow,
            egl::BAD_PARAMETER => Error::BadParameter,
            egl::BAD_SURFACE => Error::BadSurface,
            egl::CONTEXT_LOST => Error::ContextLost,
            _ => return None,
        };
        Some(error)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match *self {
            Error::NotInitialized => "EGL_NOT_INITIALIZED",
            Error::BadAccess => "EGL_BAD_ACCESS",
            Error::BadAlloc => "EGL_BAD_ALLOC",
            Error::BadAttribute => "EGL_BAD_ATTRIBUTE",
            Error::BadConfig => "EGL_BAD_CONFIG",
            Error::BadContext => "EGL_BAD_CONTEXT",
            Error::BadCurrentSurface => "EGL_BAD_CURRENT_SURFACE",
            Error::BadDisplay => "EGL_BAD_DISPLAY",
            Error::BadMatch => "EGL_BAD_MATCH",
            Error::BadNativePixmap => "EGL_BAD_NATIVE_PIXMAP",
            Error::BadNativeWindow => "EGL_BAD_NATIVE_WINDOW",
            Error::BadParameter => "EGL_BAD_PARAMETER",
            Error::BadSurface => "EGL_BAD_SURFACE",
            Error::ContextLost => "EGL_CONTEXT_LOST",
        };
        write!(f, "{} (0x{:04x})", name, self.code())
    }
}

impl std::error::Error for Error {}

// Collapses an entrypoint outcome into the code stored as the thread's pending error.
pub(crate) fn result_code<T>(result: &Result<T, Error>) -> EGLint {
    match *result {
        Ok(_) => egl::SUCCESS,
        Err(err) => err.code(),
    }
}
