// egl-runtime/src/backend/headless.rs
//
//! A client API backend that renders nothing.
//!
//! It keeps just enough bookkeeping to answer "which context is bound to which thread" and how
//! often each entry point was called. Clones share their state, so a caller can keep a clone to
//! inspect a backend it handed to a driver. Failures can be scripted one call at a time.

use super::{ApiContext, BindTarget, ContextRequest, RenderingBackend, SurfaceDesc};
use crate::config::Config;
use crate::platform::NativePixmap;
use crate::thread::ThreadKey;
use crate::Error;

use euclid::default::Size2D;
use fnv::{FnvHashMap, FnvHashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-entry-point call counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_context: u32,
    pub release_context: u32,
    pub make_current: u32,
    pub make_not_current: u32,
    pub remove_frame_builder: u32,
    pub bind_tex_image: u32,
    pub release_tex_image: u32,
    pub flush_to_client_buffer: u32,
    pub copy_to_pixmap: u32,
}

/// An image a headless context can hand out as a client buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientBuffer {
    pub size: Size2D<i32>,
    /// Bits per pixel. Only configs with this buffer size accept the buffer.
    pub buffer_size: i32,
}

#[derive(Default)]
struct HeadlessBackendData {
    next_context: u64,
    live: FnvHashSet<ApiContext>,
    current: FnvHashMap<ThreadKey, ApiContext>,
    calls: CallCounts,
    fail_next_create_context: bool,
    fail_next_make_current: bool,
    fail_next_copy: bool,
    next_client_buffer: u64,
    client_buffers: FnvHashMap<u64, ClientBuffer>,
    copies: Vec<(NativePixmap, SurfaceDesc)>,
}

#[derive(Clone, Default)]
pub struct HeadlessBackend {
    data: Arc<Mutex<HeadlessBackendData>>,
}

impl HeadlessBackend {
    pub fn new() -> HeadlessBackend {
        HeadlessBackend::default()
    }

    fn lock(&self) -> MutexGuard<HeadlessBackendData> {
        self.data.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Number of contexts created and not yet released.
    pub fn live_contexts(&self) -> usize {
        self.lock().live.len()
    }

    /// The context this backend last bound to `thread`, if it is still bound.
    pub fn current_context(&self, thread: ThreadKey) -> Option<ApiContext> {
        self.lock().current.get(&thread).cloned()
    }

    pub fn fail_next_create_context(&self) {
        self.lock().fail_next_create_context = true;
    }

    pub fn fail_next_make_current(&self) {
        self.lock().fail_next_make_current = true;
    }

    /// Makes the next `copy_to_pixmap` call fail with `BadAlloc`.
    pub fn fail_next_copy(&self) {
        self.lock().fail_next_copy = true;
    }

    /// Registers an image every context of this backend accepts as a client buffer, and returns
    /// its name.
    pub fn create_client_buffer(&self, buffer: ClientBuffer) -> u64 {
        let mut data = self.lock();
        data.next_client_buffer += 1;
        let name = 0x1000 + data.next_client_buffer;
        data.client_buffers.insert(name, buffer);
        name
    }

    /// Every copy into a native pixmap so far, oldest first.
    pub fn pixmap_copies(&self) -> Vec<(NativePixmap, SurfaceDesc)> {
        self.lock().copies.clone()
    }
}

impl RenderingBackend for HeadlessBackend {
    fn create_context(&mut self, request: &ContextRequest) -> Result<ApiContext, Error> {
        let mut data = self.lock();
        data.calls.create_context += 1;
        if data.fail_next_create_context {
            data.fail_next_create_context = false;
            return Err(Error::BadAlloc);
        }
        if let Some(share) = request.share {
            if !data.live.contains(&share) {
                return Err(Error::BadContext);
            }
        }

        data.next_context += 1;
        let context = ApiContext(data.next_context);
        data.live.insert(context);
        Ok(context)
    }

    fn release_context(&mut self, context: ApiContext, _: ThreadKey) {
        let mut data = self.lock();
        data.calls.release_context += 1;
        debug_assert!(data.live.contains(&context), "released an unknown context");
        data.live.remove(&context);
        data.current.retain(|_, current| *current != context);
    }

    fn make_current(&mut self, target: &BindTarget, thread: ThreadKey) -> Result<(), Error> {
        let mut data = self.lock();
        data.calls.make_current += 1;
        if data.fail_next_make_current {
            data.fail_next_make_current = false;
            return Err(Error::BadAlloc);
        }
        if !data.live.contains(&target.context) {
            return Err(Error::BadContext);
        }
        data.current.insert(thread, target.context);
        Ok(())
    }

    fn make_not_current(&mut self, thread: ThreadKey) {
        let mut data = self.lock();
        data.calls.make_not_current += 1;
        data.current.remove(&thread);
    }

    fn remove_frame_builder(&mut self, thread: ThreadKey) {
        let mut data = self.lock();
        data.calls.remove_frame_builder += 1;
        data.current.remove(&thread);
    }

    fn bind_tex_image(&mut self, _: &SurfaceDesc, _: ThreadKey) -> Result<(), Error> {
        self.lock().calls.bind_tex_image += 1;
        Ok(())
    }

    fn release_tex_image(&mut self, _: &SurfaceDesc, _: ThreadKey) {
        self.lock().calls.release_tex_image += 1;
    }

    fn client_buffer_size(&mut self, context: ApiContext, buffer: u64, config: &Config) -> Result<Size2D<i32>, Error> {
        let data = self.lock();
        if !data.live.contains(&context) {
            return Err(Error::BadAccess);
        }
        let image = data.client_buffers.get(&buffer).ok_or(Error::BadParameter)?;
        if image.buffer_size != config.buffer_size {
            return Err(Error::BadMatch);
        }
        Ok(image.size)
    }

    fn flush_to_client_buffer(&mut self, _: &SurfaceDesc, _: ThreadKey) -> Result<(), Error> {
        self.lock().calls.flush_to_client_buffer += 1;
        Ok(())
    }

    fn copy_to_pixmap(&mut self, surface: &SurfaceDesc, pixmap: NativePixmap, _: ThreadKey) -> Result<(), Error> {
        let mut data = self.lock();
        data.calls.copy_to_pixmap += 1;
        if data.fail_next_copy {
            data.fail_next_copy = false;
            return Err(Error::BadAlloc);
        }
        data.copies.push((pixmap, *surface));
        Ok(())
    }
}
