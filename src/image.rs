// egl-runtime/src/image.rs
//
//! `EGL_KHR_image_base` images.
//!
//! Images live in a process-wide table but belong to the display they were created on: they
//! keep a draining display from finishing its termination, and they are released with it.

use crate::backend::ClientApi;
use crate::driver::DriverState;
use crate::egl::{self, EGLenum, EGLint};
use crate::handle::Handle;
use crate::platform::NativePixmap;
use crate::Error;

use log::debug;

pub(crate) struct Image {
    pub(crate) display: Handle,
    /// The context a texture image was created from.
    pub(crate) context: Option<Handle>,
    pub(crate) target: EGLenum,
    /// Native pixmap id or texture name.
    pub(crate) buffer: u64,
    pub(crate) preserved: bool,
}

impl DriverState {
    pub(crate) fn create_image(
        &mut self,
        dpy: Handle,
        ctx: Handle,
        target: EGLenum,
        buffer: u64,
        attribs: &[EGLint],
    ) -> Result<Handle, Error> {
        let display = self.check_display_ready(dpy)?;
        let native = display.native;

        let context = match target {
            egl::NATIVE_PIXMAP_KHR => {
                if !ctx.is_none() {
                    return Err(Error::BadParameter);
                }
                if !self.platform.pixmap_valid(native, NativePixmap(buffer)) {
                    return Err(Error::BadParameter);
                }
                None
            }
            egl::GL_TEXTURE_2D_KHR => {
                let context = self.check_context(dpy, ctx)?;
                if context.api != ClientApi::OpenGlEs {
                    return Err(Error::BadContext);
                }
                if buffer == 0 {
                    return Err(Error::BadParameter);
                }
                Some(ctx)
            }
            _ => return Err(Error::BadParameter),
        };

        let mut preserved = false;
        for pair in attribs.chunks(2) {
            match (pair[0], pair.get(1)) {
                (egl::NONE, _) => break,
                (egl::IMAGE_PRESERVED_KHR, Some(&egl::TRUE)) => preserved = true,
                (egl::IMAGE_PRESERVED_KHR, Some(&egl::FALSE)) => preserved = false,
                _ => return Err(Error::BadParameter),
            }
        }

        let handle = self.images.insert(Image { display: dpy, context, target, buffer, preserved })?;
        debug!("Created image {:?} on {:?}", handle, dpy);
        Ok(handle)
    }

    pub(crate) fn destroy_image(&mut self, dpy: Handle, image: Handle) -> Result<(), Error> {
        self.check_display_ready(dpy)?;
        self.check_image(dpy, image)?;
        if let Some(removed) = self.images.remove(image) {
            debug!(
                "Destroyed image {:?} (target {:#x}, buffer {}, preserved: {})",
                image, removed.target, removed.buffer, removed.preserved
            );
        }
        Ok(())
    }

    /// Number of images that belong to `dpy`.
    pub(crate) fn images_owned(&self, dpy: Handle) -> usize {
        self.images.iter().filter(|(_, image)| image.display == dpy).count()
    }

    /// Releases the images of a display whose source context is not bound to any thread.
    pub(crate) fn release_unbound_images(&mut self, dpy: Handle) {
        let releasable: Vec<Handle> = self
            .images
            .iter()
            .filter(|(_, image)| image.display == dpy)
            .filter(|(_, image)| {
                image.context.map_or(true, |ctx| {
                    self.context(dpy, ctx).map_or(true, |context| !context.lifetime.is_current())
                })
            })
            .map(|(handle, _)| handle)
            .collect();
        for handle in releasable {
            self.images.remove(handle);
        }
    }

    /// Releases every image of a display.
    pub(crate) fn release_image_handles(&mut self, dpy: Handle) {
        let owned: Vec<Handle> = self
            .images
            .iter()
            .filter(|(_, image)| image.display == dpy)
            .map(|(handle, _)| handle)
            .collect();
        for handle in owned {
            self.images.remove(handle);
        }
    }
}
