// egl-runtime/src/sync.rs
//
//! `EGL_KHR_reusable_sync` objects.

use crate::driver::DriverState;
use crate::egl::{self, EGLenum, EGLint};
use crate::handle::Handle;
use crate::Error;

use log::debug;

pub(crate) struct SyncObject {
    pub(crate) kind: EGLenum,
    pub(crate) status: EGLint,
}

impl DriverState {
    pub(crate) fn create_sync(&mut self, dpy: Handle, kind: EGLenum, attribs: &[EGLint]) -> Result<Handle, Error> {
        self.check_display_ready(dpy)?;
        if kind != egl::SYNC_REUSABLE_KHR {
            return Err(Error::BadAttribute);
        }
        if attribs.first().map_or(false, |&attribute| attribute != egl::NONE) {
            return Err(Error::BadAttribute);
        }
        let tables = self.tables_mut(dpy).ok_or(Error::NotInitialized)?;
        tables.syncs.insert(SyncObject { kind, status: egl::UNSIGNALED_KHR })
    }

    pub(crate) fn destroy_sync(&mut self, dpy: Handle, sync: Handle) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        self.check_sync(dpy, sync)?;
        if let Some(tables) = self.tables_mut(dpy) {
            tables.syncs.remove(sync);
        }
        Ok(())
    }

    pub(crate) fn signal_sync(&mut self, dpy: Handle, sync: Handle, mode: EGLint) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        self.check_sync(dpy, sync)?;
        if mode != egl::SIGNALED_KHR && mode != egl::UNSIGNALED_KHR {
            return Err(Error::BadParameter);
        }
        let sync = self
            .tables_mut(dpy)
            .and_then(|tables| tables.syncs.get_mut(sync))
            .ok_or(Error::BadParameter)?;
        sync.status = mode;
        Ok(())
    }

    pub(crate) fn get_sync_attrib(&self, dpy: Handle, sync: Handle, attribute: EGLint) -> Result<EGLint, Error> {
        self.check_display_ready(dpy)?;
        let sync = self.check_sync(dpy, sync)?;
        match attribute {
            egl::SYNC_TYPE_KHR => Ok(sync.kind as EGLint),
            egl::SYNC_STATUS_KHR => Ok(sync.status),
            _ => Err(Error::BadAttribute),
        }
    }

    /// Drops every sync object of a display, signaled or not.
    pub(crate) fn release_sync_handles(&mut self, dpy: Handle) {
        if let Some(tables) = self.tables_mut(dpy) {
            let syncs = tables.syncs.handles();
            if !syncs.is_empty() {
                debug!("Releasing {} sync objects of {:?}", syncs.len(), dpy);
            }
            for sync in syncs {
                tables.syncs.remove(sync);
            }
        }
    }
}
