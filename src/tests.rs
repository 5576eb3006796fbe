// egl-runtime/src/tests.rs
//
//! Unit tests.

use crate::backend::headless::{ClientBuffer, HeadlessBackend};
use crate::backend::ClientApi;
use crate::display::DisplayFlags;
use crate::egl::{self, EGLint};
use crate::platform::headless::HeadlessPlatform;
use crate::platform::{NativeDisplay, NativePlatform, PixelFormat, DEFAULT_DISPLAY};
use crate::{Driver, Error, Handle, ThreadIdentity, ThreadKey};

use euclid::default::Size2D;
use log::{LevelFilter, Log, Metadata, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex, Once};
use std::thread;

const NO_ATTRIBS: [EGLint; 1] = [egl::NONE];
const PBUFFER_64: [EGLint; 5] = [egl::WIDTH, 64, egl::HEIGHT, 64, egl::NONE];

struct Harness {
    platform: Arc<HeadlessPlatform>,
    gles: HeadlessBackend,
    vg: HeadlessBackend,
    driver: Driver,
}

impl Harness {
    fn new() -> Harness {
        Harness::with_identity(ThreadIdentity::Os)
    }

    fn with_identity(identity: ThreadIdentity) -> Harness {
        let platform = Arc::new(HeadlessPlatform::new());
        let gles = HeadlessBackend::new();
        let vg = HeadlessBackend::new();
        let driver = Driver::builder(platform.clone())
            .backend(ClientApi::OpenGlEs, Box::new(gles.clone()))
            .backend(ClientApi::OpenVg, Box::new(vg.clone()))
            .thread_identity(identity)
            .build();
        Harness { platform, gles, vg, driver }
    }

    fn display(&self) -> Handle {
        let dpy = self.driver.get_display(DEFAULT_DISPLAY).unwrap();
        assert_eq!(self.driver.initialize(dpy), Ok((1, 4)));
        dpy
    }

    // The RGBA8888 window config without ancillary buffers. It supports every client API and
    // surface kind.
    fn config(&self, dpy: Handle) -> Handle {
        self.driver.choose_config(dpy, &NO_ATTRIBS).unwrap()[0]
    }

    fn context(&self, dpy: Handle) -> Handle {
        let config = self.config(dpy);
        self.driver.create_context(dpy, config, Handle::NONE, &NO_ATTRIBS).unwrap()
    }

    fn pbuffer(&self, dpy: Handle) -> Handle {
        let config = self.config(dpy);
        self.driver.create_pbuffer_surface(dpy, config, &PBUFFER_64).unwrap()
    }

    fn context_refs(&self, dpy: Handle, ctx: Handle) -> Option<u32> {
        let state = self.driver.state.lock();
        state.context(dpy, ctx).map(|context| context.lifetime.references())
    }

    fn surface_refs(&self, dpy: Handle, surface: Handle) -> Option<u32> {
        let state = self.driver.state.lock();
        state.surface(dpy, surface).map(|surface| surface.lifetime.references())
    }

    fn flags(&self, dpy: Handle) -> DisplayFlags {
        let state = self.driver.state.lock();
        state.displays.get(dpy).map(|display| display.flags).unwrap_or_default()
    }

    fn thread_count(&self) -> usize {
        self.driver.threads.lock().len()
    }
}

// Thread identities that tests can force to collide.
static NEXT_FAKE_THREAD_ID: AtomicU64 = AtomicU64::new(1000);

thread_local! {
    static FAKE_THREAD_ID: Cell<u64> = Cell::new(0);
}

fn fake_thread_identity() -> ThreadIdentity {
    ThreadIdentity::Custom(Arc::new(|| {
        FAKE_THREAD_ID.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_FAKE_THREAD_ID.fetch_add(1, Ordering::Relaxed));
            }
            id.get()
        })
    }))
}

fn pretend_to_be_thread(id: u64) {
    FAKE_THREAD_ID.with(|current| current.set(id));
}

// Captures log records of the trace target.
struct TraceCapture;

static TRACE_LOGGER: TraceCapture = TraceCapture;
static TRACE_RECORDS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static INSTALL_LOGGER: Once = Once::new();

impl Log for TraceCapture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.target() == "egl_runtime::trace" {
            let mut records = TRACE_RECORDS.lock().unwrap_or_else(|err| err.into_inner());
            records.push(format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

fn install_trace_capture() {
    INSTALL_LOGGER.call_once(|| {
        log::set_logger(&TRACE_LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

#[test]
fn test_initialize_twice_is_a_no_op() {
    let harness = Harness::new();
    let dpy = harness.driver.get_display(DEFAULT_DISPLAY).unwrap();
    assert!(!dpy.is_none());
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());

    assert_eq!(harness.driver.initialize(dpy), Ok((1, 4)));
    assert_eq!(harness.flags(dpy), DisplayFlags::INITIALIZED);
    assert_eq!(harness.driver.initialize(dpy), Ok((1, 4)));
    assert_eq!(harness.flags(dpy), DisplayFlags::INITIALIZED);

    let native = harness.platform.default_display();
    assert_eq!(harness.platform.init_count(native), 1);
    assert_eq!(harness.platform.device_open_count(), 1);
    assert!(harness.platform.is_device_open());
}

#[test]
fn test_get_display_is_idempotent() {
    let harness = Harness::new();
    let default = harness.driver.get_display(DEFAULT_DISPLAY).unwrap();
    assert_eq!(harness.driver.get_display(DEFAULT_DISPLAY), Ok(default));

    harness.platform.add_display(NativeDisplay(9));
    let other = harness.driver.get_display(NativeDisplay(9)).unwrap();
    assert_ne!(other, default);
    assert_eq!(harness.driver.get_display(NativeDisplay(9)), Ok(other));

    // Unknown native displays are not an error, just no display.
    assert_eq!(harness.driver.get_display(NativeDisplay(77)), Ok(Handle::NONE));
}

#[test]
fn test_default_and_explicit_native_share_a_display() {
    let harness = Harness::new();
    let native = harness.platform.default_display();
    let default = harness.driver.get_display(DEFAULT_DISPLAY).unwrap();
    assert_eq!(harness.driver.get_display(native), Ok(default));

    // Same the other way round, on a driver that saw the explicit value first.
    let harness = Harness::new();
    let explicit = harness.driver.get_display(native).unwrap();
    assert_ne!(explicit, Handle::NONE);
    assert_eq!(harness.driver.get_display(DEFAULT_DISPLAY), Ok(explicit));
    assert_eq!(harness.driver.state.lock().displays.handles().len(), 1);
}

#[test]
fn test_device_is_shared_between_displays() {
    let harness = Harness::new();
    harness.platform.add_display(NativeDisplay(9));
    let first = harness.display();
    let second = harness.driver.get_display(NativeDisplay(9)).unwrap();
    harness.driver.initialize(second).unwrap();
    assert_eq!(harness.platform.device_open_count(), 1);

    harness.driver.terminate(first).unwrap();
    assert!(harness.platform.is_device_open());
    harness.driver.terminate(second).unwrap();
    assert!(!harness.platform.is_device_open());
}

#[test]
fn test_initialize_rolls_back_on_platform_failure() {
    let harness = Harness::new();
    let dpy = harness.driver.get_display(DEFAULT_DISPLAY).unwrap();

    harness.platform.fail_next_init();
    assert_eq!(harness.driver.initialize(dpy), Err(Error::BadAlloc));
    assert_eq!(harness.driver.get_error(), egl::BAD_ALLOC);
    assert!(!harness.platform.is_device_open());
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
    assert_eq!(harness.driver.get_configs(dpy), Err(Error::NotInitialized));

    harness.platform.fail_next_device_open();
    assert_eq!(harness.driver.initialize(dpy), Err(Error::BadAlloc));
    assert_eq!(harness.driver.get_error(), egl::BAD_ALLOC);
    assert!(!harness.platform.is_device_open());

    assert_eq!(harness.driver.initialize(dpy), Ok((1, 4)));
    assert!(harness.platform.is_device_open());
    assert_eq!(harness.driver.get_configs(dpy).unwrap().len(), 13);
}

#[test]
fn test_default_display_is_refreshed_on_initialize() {
    let harness = Harness::new();
    let dpy = harness.display();
    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());

    harness.platform.set_default_display(NativeDisplay(5));
    harness.driver.initialize(dpy).unwrap();
    let native = harness.driver.state.lock().displays.get(dpy).map(|display| display.native);
    assert_eq!(native, Some(NativeDisplay(5)));
    assert_eq!(harness.platform.init_count(NativeDisplay(5)), 1);
}

#[test]
fn test_query_string() {
    let harness = Harness::new();
    let dpy = harness.driver.get_display(DEFAULT_DISPLAY).unwrap();
    assert_eq!(harness.driver.query_string(dpy, egl::VENDOR), Err(Error::NotInitialized));

    harness.driver.initialize(dpy).unwrap();
    assert_eq!(harness.driver.query_string(dpy, egl::VENDOR), Ok("egl-runtime"));
    assert!(harness.driver.query_string(dpy, egl::VERSION).unwrap().starts_with("1.4 "));
    assert_eq!(harness.driver.query_string(dpy, egl::CLIENT_APIS), Ok("OpenGL_ES OpenVG"));
    assert!(harness
        .driver
        .query_string(dpy, egl::EXTENSIONS)
        .unwrap()
        .contains("EGL_KHR_gl_texture_2D_image"));
    assert_eq!(harness.driver.query_string(dpy, egl::WIDTH), Err(Error::BadParameter));
}

#[test]
fn test_configs_follow_display_format() {
    let harness = Harness::new();
    harness.platform.set_format(PixelFormat::Rgb565);
    let dpy = harness.display();
    let configs = harness.driver.get_configs(dpy).unwrap();
    assert_eq!(configs.len(), 5);

    let window = harness.driver.choose_config(dpy, &NO_ATTRIBS).unwrap();
    let red = harness.driver.get_config_attrib(dpy, window[0], egl::RED_SIZE);
    assert_eq!(red, Ok(5));
    assert_eq!(
        harness.driver.get_config_attrib(dpy, window[0], egl::HEIGHT),
        Err(Error::BadAttribute)
    );
    assert_eq!(
        harness.driver.get_config_attrib(dpy, Handle::from_raw(0xc000_ffff), egl::RED_SIZE),
        Err(Error::BadConfig)
    );
}

#[test]
fn test_choose_config_sorts_best_first() {
    let harness = Harness::new();
    let dpy = harness.display();

    let deep = harness
        .driver
        .choose_config(dpy, &[egl::SURFACE_TYPE, egl::PBUFFER_BIT, egl::RED_SIZE, 1, egl::NONE])
        .unwrap();
    assert_eq!(harness.driver.get_config_attrib(dpy, deep[0], egl::RED_SIZE), Ok(8));
    assert_eq!(harness.driver.get_config_attrib(dpy, deep[0], egl::DEPTH_SIZE), Ok(0));

    let luminance = harness
        .driver
        .choose_config(
            dpy,
            &[
                egl::SURFACE_TYPE,
                egl::PBUFFER_BIT,
                egl::RENDERABLE_TYPE,
                egl::OPENVG_BIT,
                egl::COLOR_BUFFER_TYPE,
                egl::LUMINANCE_BUFFER,
                egl::NONE,
            ],
        )
        .unwrap();
    assert_eq!(luminance.len(), 1);
    assert_eq!(harness.driver.get_config_attrib(dpy, luminance[0], egl::CONFIG_ID), Ok(13));

    let by_id = harness.driver.choose_config(dpy, &[egl::CONFIG_ID, 3, egl::NONE]).unwrap();
    assert_eq!(harness.driver.get_config_attrib(dpy, by_id[0], egl::CONFIG_ID), Ok(3));

    assert_eq!(harness.driver.choose_config(dpy, &[egl::WIDTH, 1, egl::NONE]), Err(Error::BadAttribute));
}

#[test]
fn test_handles_do_not_resolve_as_other_types() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    assert_eq!(harness.driver.query_context(dpy, surface, egl::CONFIG_ID), Err(Error::BadContext));
    assert_eq!(harness.driver.query_surface(dpy, ctx, egl::CONFIG_ID), Err(Error::BadSurface));
    assert_eq!(harness.driver.initialize(ctx), Err(Error::BadDisplay));
    assert_eq!(harness.driver.make_current(dpy, ctx, ctx, ctx), Err(Error::BadSurface));
    assert_eq!(harness.driver.make_current(dpy, surface, surface, surface), Err(Error::BadContext));
}

#[test]
fn test_share_context_must_use_the_active_api() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let first = harness.driver.create_context(dpy, config, Handle::NONE, &NO_ATTRIBS).unwrap();

    let shared = harness.driver.create_context(dpy, config, first, &NO_ATTRIBS).unwrap();
    assert_eq!(harness.gles.live_contexts(), 2);
    harness.driver.destroy_context(dpy, shared).unwrap();

    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    assert_eq!(
        harness.driver.create_context(dpy, config, first, &NO_ATTRIBS),
        Err(Error::BadContext)
    );
    assert_eq!(harness.driver.get_error(), egl::BAD_CONTEXT);
    assert_eq!(harness.vg.live_contexts(), 0);
}

#[test]
fn test_create_context_validation() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);

    let gles2 = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
    let ctx = harness.driver.create_context(dpy, config, Handle::NONE, &gles2).unwrap();
    assert_eq!(harness.driver.query_context(dpy, ctx, egl::CONTEXT_CLIENT_VERSION), Ok(2));
    assert_eq!(
        harness.driver.query_context(dpy, ctx, egl::CONTEXT_CLIENT_TYPE),
        Ok(egl::OPENGL_ES_API as EGLint)
    );
    assert_eq!(harness.driver.query_context(dpy, ctx, egl::RENDER_BUFFER), Ok(egl::NONE));
    assert_eq!(harness.driver.query_context(dpy, ctx, egl::WIDTH), Err(Error::BadAttribute));

    // The luminance config renders OpenVG only.
    let luminance = harness
        .driver
        .choose_config(dpy, &[egl::SURFACE_TYPE, egl::PBUFFER_BIT, egl::CONFIG_ID, 13, egl::NONE])
        .unwrap()[0];
    assert_eq!(
        harness.driver.create_context(dpy, luminance, Handle::NONE, &NO_ATTRIBS),
        Err(Error::BadMatch)
    );

    harness.gles.fail_next_create_context();
    assert_eq!(
        harness.driver.create_context(dpy, config, Handle::NONE, &NO_ATTRIBS),
        Err(Error::BadAlloc)
    );
    assert_eq!(harness.gles.live_contexts(), 1);
}

#[test]
fn test_make_current_rejects_partial_triples() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    let none = Handle::NONE;

    for &(draw, read, context) in &[
        (surface, surface, none),
        (surface, none, ctx),
        (none, surface, ctx),
        (none, none, ctx),
        (surface, none, none),
    ] {
        assert_eq!(harness.driver.make_current(dpy, draw, read, context), Err(Error::BadMatch));
    }
    assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(1));
    assert_eq!(harness.gles.calls().make_current, 0);
}

#[test]
fn test_bind_and_unbind_restores_references() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let draw = harness.pbuffer(dpy);
    let read = harness.pbuffer(dpy);

    harness.driver.make_current(dpy, draw, read, ctx).unwrap();
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
    assert_eq!(harness.surface_refs(dpy, draw), Some(2));
    assert_eq!(harness.surface_refs(dpy, read), Some(2));
    assert_eq!(harness.driver.get_current_context(), Ok(ctx));
    assert_eq!(harness.driver.get_current_surface(egl::DRAW), Ok(draw));
    assert_eq!(harness.driver.get_current_surface(egl::READ), Ok(read));
    assert_eq!(harness.driver.get_current_display(), Ok(dpy));
    assert_eq!(harness.driver.get_current_surface(egl::WIDTH), Err(Error::BadParameter));
    assert!(harness.gles.current_context(harness.driver.thread_key()).is_some());

    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, draw), Some(1));
    assert_eq!(harness.surface_refs(dpy, read), Some(1));
    assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
    assert_eq!(harness.driver.get_current_display(), Ok(Handle::NONE));
    assert!(harness.gles.current_context(harness.driver.thread_key()).is_none());
    assert!(harness.driver.threads.lock().get(harness.driver.thread_key()).unwrap().gles.is_none());
}

#[test]
fn test_repeated_make_current_short_circuits() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    let calls = harness.gles.calls();
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    assert_eq!(harness.gles.calls(), calls);
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
    // One reference per role.
    assert_eq!(harness.surface_refs(dpy, surface), Some(3));
}

#[test]
fn test_swapping_roles_keeps_reference_counts() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let a = harness.pbuffer(dpy);
    let b = harness.pbuffer(dpy);

    harness.driver.make_current(dpy, a, b, ctx).unwrap();
    harness.driver.make_current(dpy, b, a, ctx).unwrap();
    assert_eq!(harness.surface_refs(dpy, a), Some(2));
    assert_eq!(harness.surface_refs(dpy, b), Some(2));
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
    assert_eq!(harness.gles.calls().remove_frame_builder, 0);

    // Plain pbuffers have no client buffer to flush into.
    let posts = harness.driver.state.lock().surface(dpy, a).map(|surface| surface.frame.lock().pbuffer_posts);
    assert_eq!(posts, Some(0));
    assert_eq!(harness.gles.calls().flush_to_client_buffer, 0);
}

#[test]
fn test_destroying_current_objects_defers_the_free() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();

    harness.driver.destroy_context(dpy, ctx).unwrap();
    harness.driver.destroy_surface(dpy, surface).unwrap();
    assert_eq!(harness.driver.query_context(dpy, ctx, egl::CONFIG_ID), Err(Error::BadContext));
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::WIDTH), Err(Error::BadSurface));
    assert_eq!(harness.driver.destroy_context(dpy, ctx), Err(Error::BadContext));
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(2));
    assert_eq!(harness.gles.live_contexts(), 1);

    // Still current, so the thread keeps rendering with them.
    assert_eq!(harness.driver.get_current_context(), Ok(ctx));

    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    assert_eq!(harness.context_refs(dpy, ctx), None);
    assert_eq!(harness.surface_refs(dpy, surface), None);
    assert_eq!(harness.gles.live_contexts(), 0);
    assert_eq!(harness.gles.calls().release_context, 1);
}

#[test]
fn test_context_current_on_another_thread_is_not_stolen() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let mine = harness.pbuffer(dpy);
    let theirs = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, mine, mine, ctx).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            assert_eq!(harness.driver.make_current(dpy, theirs, theirs, ctx), Err(Error::BadAccess));
            assert_eq!(harness.driver.get_error(), egl::BAD_ACCESS);
            assert_eq!(harness.driver.make_current(dpy, mine, mine, ctx), Err(Error::BadAccess));
            assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
            harness.driver.release_thread().unwrap();
        });
    });

    assert_eq!(harness.driver.get_current_context(), Ok(ctx));
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
    assert_eq!(harness.surface_refs(dpy, theirs), Some(1));
}

#[test]
fn test_surface_current_on_another_thread_is_not_stolen() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let other = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            assert_eq!(
                harness.driver.make_current(dpy, surface, surface, other),
                Err(Error::BadAccess)
            );
        });
    });
    assert_eq!(harness.context_refs(dpy, other), Some(1));
}

#[test]
fn test_surface_shared_between_apis_on_one_thread() {
    let harness = Harness::new();
    let dpy = harness.display();
    let gles_ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, gles_ctx).unwrap();

    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    let vg_ctx = harness.context(dpy);
    harness.driver.make_current(dpy, surface, surface, vg_ctx).unwrap();
    assert_eq!(harness.surface_refs(dpy, surface), Some(5));

    // Unbinding VG leaves the surface current through GLES.
    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    assert_eq!(harness.surface_refs(dpy, surface), Some(3));
    let current = harness.driver.state.lock().surface(dpy, surface).map(|surface| surface.lifetime.is_current());
    assert_eq!(current, Some(true));
}

#[test]
fn test_vg_requires_matching_draw_and_read() {
    let harness = Harness::new();
    let dpy = harness.display();
    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    let ctx = harness.context(dpy);
    let a = harness.pbuffer(dpy);
    let b = harness.pbuffer(dpy);

    assert_eq!(harness.driver.make_current(dpy, a, b, ctx), Err(Error::BadMatch));
    harness.driver.make_current(dpy, a, a, ctx).unwrap();
    assert_eq!(harness.vg.calls().make_current, 1);
    assert_eq!(harness.gles.calls().make_current, 0);
}

#[test]
fn test_incompatible_surface_is_rejected() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let depth = harness
        .driver
        .choose_config(dpy, &[egl::SURFACE_TYPE, egl::PBUFFER_BIT, egl::DEPTH_SIZE, 24, egl::NONE])
        .unwrap()[0];
    let surface = harness.driver.create_pbuffer_surface(dpy, depth, &PBUFFER_64).unwrap();
    assert_eq!(harness.driver.make_current(dpy, surface, surface, ctx), Err(Error::BadMatch));
}

#[test]
fn test_lost_context_cannot_be_bound() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    assert_eq!(harness.driver.lose_contexts(dpy), Ok(1));
    assert_eq!(harness.driver.make_current(dpy, surface, surface, ctx), Err(Error::ContextLost));
    assert_eq!(harness.driver.get_error(), egl::CONTEXT_LOST);
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
}

#[test]
fn test_backend_failure_leaves_thread_unbound() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let a = harness.pbuffer(dpy);
    let b = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, a, a, ctx).unwrap();

    harness.gles.fail_next_make_current();
    assert_eq!(harness.driver.make_current(dpy, b, b, ctx), Err(Error::BadAlloc));
    assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, a), Some(1));
    assert_eq!(harness.surface_refs(dpy, b), Some(1));

    // Nothing is pinned any more, so the objects can be bound again.
    harness.driver.make_current(dpy, b, b, ctx).unwrap();
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
}

#[test]
fn test_terminate_while_current_drains_on_unbind() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    let idle = harness.pbuffer(dpy);
    let idle_ctx = harness.context(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();

    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::INITIALIZED | DisplayFlags::TERMINATING);
    assert_eq!(harness.surface_refs(dpy, idle), None);
    assert_eq!(harness.context_refs(dpy, idle_ctx), None);
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.gles.live_contexts(), 1);

    // Terminating again is a no-op.
    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::INITIALIZED | DisplayFlags::TERMINATING);

    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
    assert_eq!(harness.gles.live_contexts(), 0);
    assert!(!harness.platform.is_device_open());
    assert_eq!(harness.platform.init_count(harness.platform.default_display()), 0);

    // The display can be brought back.
    assert_eq!(harness.driver.initialize(dpy), Ok((1, 4)));
    assert_eq!(harness.flags(dpy), DisplayFlags::INITIALIZED);
}

#[test]
fn test_draining_display_rejects_new_bindings() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    let config = harness.config(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    harness.driver.terminate(dpy).unwrap();

    assert_eq!(harness.driver.make_current(dpy, surface, surface, ctx), Err(Error::NotInitialized));
    assert_eq!(harness.driver.get_error(), egl::NOT_INITIALIZED);
    let none = Handle::NONE;
    assert_eq!(harness.driver.make_current(dpy, none, none, ctx), Err(Error::BadMatch));
    assert_eq!(harness.driver.make_current(dpy, surface, none, none), Err(Error::BadMatch));
    assert_eq!(
        harness.driver.create_pbuffer_surface(dpy, config, &PBUFFER_64),
        Err(Error::NotInitialized)
    );
    assert_eq!(harness.driver.choose_config(dpy, &NO_ATTRIBS), Err(Error::NotInitialized));
    assert_eq!(harness.driver.get_current_context(), Ok(ctx));
}

#[test]
fn test_terminate_releases_calling_thread() {
    let harness = Harness::new();
    let dpy = harness.display();
    harness.context(dpy);
    assert_eq!(harness.thread_count(), 1);

    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.thread_count(), 0);
    assert_eq!(harness.gles.live_contexts(), 0);
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
}

#[test]
fn test_stale_thread_state_is_recovered() {
    let harness = Harness::with_identity(fake_thread_identity());
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    thread::scope(|scope| {
        scope.spawn(|| {
            pretend_to_be_thread(7);
            harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
            // Exits without releasing its state.
        });
    });
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));
    assert_eq!(harness.surface_refs(dpy, surface), Some(3));
    assert!(harness.gles.current_context(ThreadKey(7)).is_some());

    thread::scope(|scope| {
        scope.spawn(|| {
            pretend_to_be_thread(7);
            assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
            assert_eq!(harness.driver.thread_key(), ThreadKey(7));
        });
    });
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(1));
    assert!(harness.gles.current_context(ThreadKey(7)).is_none());

    // The context is free to be bound elsewhere again.
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
}

#[test]
fn test_release_thread_unbinds_everything() {
    let harness = Harness::new();
    let dpy = harness.display();
    let gles_ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    let vg_ctx = harness.context(dpy);
    let vg_surface = harness.pbuffer(dpy);
    harness.driver.bind_api(egl::OPENGL_ES_API).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            harness.driver.make_current(dpy, surface, surface, gles_ctx).unwrap();
            harness.driver.bind_api(egl::OPENVG_API).unwrap();
            harness.driver.make_current(dpy, vg_surface, vg_surface, vg_ctx).unwrap();
            assert_eq!(harness.thread_count(), 2);

            harness.driver.release_thread().unwrap();
            assert_eq!(harness.thread_count(), 1);
            // Releasing twice is harmless.
            harness.driver.release_thread().unwrap();
        });
    });

    assert_eq!(harness.context_refs(dpy, gles_ctx), Some(1));
    assert_eq!(harness.context_refs(dpy, vg_ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(1));
    assert_eq!(harness.surface_refs(dpy, vg_surface), Some(1));
}

#[test]
fn test_release_thread_survives_failed_api_switch() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    harness.driver.bind_api(egl::OPENVG_API).unwrap();

    // Switching back to GLES while unwinding fails at the backend.
    harness.gles.fail_next_make_current();
    harness.driver.release_thread().unwrap();
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(1));
    assert_eq!(harness.thread_count(), 0);

    harness.driver.destroy_context(dpy, ctx).unwrap();
    assert_eq!(harness.gles.live_contexts(), 0);
    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
}

#[test]
fn test_stale_recovery_survives_failed_api_switch() {
    let harness = Harness::with_identity(fake_thread_identity());
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    thread::scope(|scope| {
        scope.spawn(|| {
            pretend_to_be_thread(8);
            harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
            harness.driver.bind_api(egl::OPENVG_API).unwrap();
        });
    });
    assert_eq!(harness.context_refs(dpy, ctx), Some(2));

    harness.gles.fail_next_make_current();
    thread::scope(|scope| {
        scope.spawn(|| {
            pretend_to_be_thread(8);
            assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));
        });
    });
    assert_eq!(harness.context_refs(dpy, ctx), Some(1));
    assert_eq!(harness.surface_refs(dpy, surface), Some(1));

    harness.driver.terminate(dpy).unwrap();
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
    assert_eq!(harness.gles.live_contexts(), 0);
}

#[test]
fn test_bind_api_switches_active_binding() {
    let harness = Harness::new();
    let dpy = harness.display();
    assert_eq!(harness.driver.query_api(), egl::OPENGL_ES_API);
    assert_eq!(harness.driver.bind_api(0x1234), Err(Error::BadParameter));
    assert_eq!(harness.driver.get_error(), egl::BAD_PARAMETER);
    assert_eq!(harness.driver.get_error(), egl::SUCCESS);

    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    let binds = harness.gles.calls().make_current;

    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    assert_eq!(harness.driver.query_api(), egl::OPENVG_API);
    assert_eq!(harness.gles.calls().make_not_current, 1);
    assert_eq!(harness.driver.get_current_context(), Ok(Handle::NONE));

    harness.driver.bind_api(egl::OPENGL_ES_API).unwrap();
    assert_eq!(harness.gles.calls().make_current, binds + 1);
    assert_eq!(harness.driver.get_current_context(), Ok(ctx));
}

#[test]
fn test_default_api_falls_back_to_installed_backend() {
    let platform = Arc::new(HeadlessPlatform::new());
    let vg = HeadlessBackend::new();
    let driver = Driver::builder(platform)
        .backend(ClientApi::OpenVg, Box::new(vg))
        .build();
    assert_eq!(driver.query_api(), egl::OPENVG_API);
    assert_eq!(driver.bind_api(egl::OPENGL_ES_API), Err(Error::BadParameter));
}

#[test]
fn test_window_surfaces() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let window = harness.platform.create_window(Size2D::new(640, 480));

    let surface = harness.driver.create_window_surface(dpy, config, window, &NO_ATTRIBS).unwrap();
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::WIDTH), Ok(640));
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::RENDER_BUFFER), Ok(egl::BACK_BUFFER));
    assert_eq!(
        harness.driver.create_window_surface(dpy, config, window, &NO_ATTRIBS),
        Err(Error::BadAlloc)
    );
    let other = harness.platform.create_window(Size2D::new(10, 10));
    assert_eq!(
        harness.driver.create_window_surface(dpy, config, other, &[egl::WIDTH, 10, egl::NONE]),
        Err(Error::BadAttribute)
    );

    harness.platform.resize_window(window, Size2D::new(320, 200));
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::HEIGHT), Ok(200));

    harness.platform.destroy_window(window);
    let gone = harness.platform.create_window(Size2D::new(1, 1));
    harness.platform.destroy_window(gone);
    assert_eq!(
        harness.driver.create_window_surface(dpy, config, gone, &NO_ATTRIBS),
        Err(Error::BadNativeWindow)
    );
}

#[test]
fn test_pixmap_surfaces() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let pixmap = harness.platform.create_pixmap(Size2D::new(16, 8));

    let surface = harness.driver.create_pixmap_surface(dpy, config, pixmap, &NO_ATTRIBS).unwrap();
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::WIDTH), Ok(16));
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::RENDER_BUFFER), Ok(egl::SINGLE_BUFFER));
    assert_eq!(
        harness.driver.create_pixmap_surface(dpy, config, pixmap, &NO_ATTRIBS),
        Err(Error::BadAlloc)
    );
    assert_eq!(
        harness.driver.create_pixmap_surface(dpy, config, crate::NativePixmap(1), &NO_ATTRIBS),
        Err(Error::BadNativePixmap)
    );

    let ctx = harness.context(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    assert_eq!(harness.driver.query_context(dpy, ctx, egl::RENDER_BUFFER), Ok(egl::SINGLE_BUFFER));
}

#[test]
fn test_wait_client_resolves_pixmap_surfaces() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let pixmap = harness.platform.create_pixmap(Size2D::new(16, 8));
    let surface = harness.driver.create_pixmap_surface(dpy, config, pixmap, &NO_ATTRIBS).unwrap();
    let pbuffer = harness.pbuffer(dpy);
    let ctx = harness.context(dpy);

    // Nothing current, nothing to wait for.
    harness.driver.wait_client().unwrap();
    harness.driver.wait_gl().unwrap();
    harness.driver.make_current(dpy, pbuffer, pbuffer, ctx).unwrap();
    harness.driver.wait_client().unwrap();
    assert_eq!(harness.gles.calls().copy_to_pixmap, 0);

    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    harness.driver.wait_client().unwrap();
    let copies = harness.gles.pixmap_copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].0, pixmap);
    assert_eq!(copies[0].1.surface, surface);

    // wait_gl reaches the GLES binding while VG is the active API.
    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    harness.driver.wait_client().unwrap();
    assert_eq!(harness.gles.calls().copy_to_pixmap, 1);
    harness.driver.wait_gl().unwrap();
    assert_eq!(harness.gles.calls().copy_to_pixmap, 2);
    assert_eq!(harness.driver.query_api(), egl::OPENVG_API);

    harness.gles.fail_next_copy();
    assert_eq!(harness.driver.wait_gl(), Err(Error::BadAlloc));
    assert_eq!(harness.driver.get_error(), egl::BAD_ALLOC);
}

#[test]
fn test_wait_native_only_concerns_pixmaps() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let pixmap = harness.platform.create_pixmap(Size2D::new(16, 8));
    let surface = harness.driver.create_pixmap_surface(dpy, config, pixmap, &NO_ATTRIBS).unwrap();
    let pbuffer = harness.pbuffer(dpy);
    let ctx = harness.context(dpy);

    harness.driver.wait_native(0x1234).unwrap();
    harness.driver.make_current(dpy, pbuffer, pbuffer, ctx).unwrap();
    harness.driver.wait_native(0x1234).unwrap();
    assert_eq!(harness.platform.native_waits(), 0);

    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    assert_eq!(harness.driver.wait_native(0x1234), Err(Error::BadParameter));
    harness.driver.wait_native(egl::CORE_NATIVE_ENGINE).unwrap();
    assert_eq!(harness.platform.native_waits(), 1);

    harness.platform.fail_next_wait_native();
    assert_eq!(harness.driver.wait_native(egl::CORE_NATIVE_ENGINE), Err(Error::BadAlloc));
}

#[test]
fn test_copy_buffers_into_pixmaps() {
    let harness = Harness::new();
    let dpy = harness.display();
    let surface = harness.pbuffer(dpy);
    let other = harness.pbuffer(dpy);
    let ctx = harness.context(dpy);
    let target = harness.platform.create_pixmap(Size2D::new(64, 64));
    let small = harness.platform.create_pixmap(Size2D::new(8, 8));

    assert_eq!(harness.driver.copy_buffers(dpy, surface, target), Err(Error::BadContext));
    assert_eq!(
        harness.driver.copy_buffers(dpy, surface, crate::NativePixmap(1)),
        Err(Error::BadNativePixmap)
    );

    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    assert_eq!(harness.driver.copy_buffers(dpy, other, target), Err(Error::BadSurface));
    assert_eq!(harness.driver.copy_buffers(dpy, surface, small), Err(Error::BadMatch));
    harness.driver.copy_buffers(dpy, surface, target).unwrap();
    let copies = harness.gles.pixmap_copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].0, target);
    assert_eq!(copies[0].1.size, Size2D::new(64, 64));

    harness.gles.fail_next_copy();
    assert_eq!(harness.driver.copy_buffers(dpy, surface, target), Err(Error::BadAlloc));

    harness.driver.lose_contexts(dpy).unwrap();
    assert_eq!(harness.driver.copy_buffers(dpy, surface, target), Err(Error::ContextLost));
}

#[test]
fn test_pbuffer_from_client_buffer() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let image = harness.vg.create_client_buffer(ClientBuffer { size: Size2D::new(20, 10), buffer_size: 32 });
    let shallow = harness.vg.create_client_buffer(ClientBuffer { size: Size2D::new(4, 4), buffer_size: 16 });
    let attribs = [egl::WIDTH, 99, egl::VG_COLORSPACE, 0, egl::NONE];
    let create = |buffer_type, buffer| {
        harness.driver.create_pbuffer_from_client_buffer(dpy, buffer_type, buffer, config, &attribs)
    };

    // Needs a current OpenVG context.
    assert_eq!(create(egl::OPENVG_IMAGE, image), Err(Error::BadAccess));
    harness.driver.bind_api(egl::OPENVG_API).unwrap();
    let ctx = harness.context(dpy);
    let plain = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, plain, plain, ctx).unwrap();

    assert_eq!(create(0x1234, image), Err(Error::BadParameter));
    assert_eq!(create(egl::OPENVG_IMAGE, 0), Err(Error::BadParameter));
    assert_eq!(create(egl::OPENVG_IMAGE, 0x9999), Err(Error::BadParameter));
    assert_eq!(create(egl::OPENVG_IMAGE, shallow), Err(Error::BadMatch));

    let wrapped = create(egl::OPENVG_IMAGE, image).unwrap();
    assert_eq!(harness.driver.query_surface(dpy, wrapped, egl::WIDTH), Ok(20));
    assert_eq!(harness.driver.query_surface(dpy, wrapped, egl::HEIGHT), Ok(10));
    assert_eq!(create(egl::OPENVG_IMAGE, image), Err(Error::BadAccess));

    // Unbinding the wrapping pbuffer flushes rendering into the image.
    harness.driver.make_current(dpy, wrapped, wrapped, ctx).unwrap();
    assert_eq!(harness.vg.calls().flush_to_client_buffer, 0);
    harness.driver.make_current(dpy, plain, plain, ctx).unwrap();
    assert_eq!(harness.vg.calls().flush_to_client_buffer, 1);
}

#[test]
fn test_pbuffer_attributes() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);

    let oversized = [egl::WIDTH, 5000, egl::NONE];
    assert_eq!(harness.driver.create_pbuffer_surface(dpy, config, &oversized), Err(Error::BadParameter));
    let format_only = [egl::TEXTURE_FORMAT, egl::TEXTURE_RGBA, egl::NONE];
    assert_eq!(harness.driver.create_pbuffer_surface(dpy, config, &format_only), Err(Error::BadMatch));
    let rgb = [egl::TEXTURE_FORMAT, egl::TEXTURE_RGB, egl::TEXTURE_TARGET, egl::TEXTURE_2D, egl::NONE];
    assert_eq!(harness.driver.create_pbuffer_surface(dpy, config, &rgb), Err(Error::BadMatch));
    let bad_bool = [egl::LARGEST_PBUFFER, 3, egl::NONE];
    assert_eq!(harness.driver.create_pbuffer_surface(dpy, config, &bad_bool), Err(Error::BadAttribute));

    let surface = harness.pbuffer(dpy);
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::WIDTH), Ok(64));
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::TEXTURE_FORMAT), Ok(egl::NO_TEXTURE));
    harness.driver.surface_attrib(dpy, surface, egl::MIPMAP_LEVEL, 2).unwrap();
    assert_eq!(harness.driver.query_surface(dpy, surface, egl::MIPMAP_LEVEL), Ok(2));
    assert_eq!(
        harness.driver.surface_attrib(dpy, surface, egl::SWAP_BEHAVIOR, egl::BUFFER_PRESERVED),
        Err(Error::BadMatch)
    );
    assert_eq!(
        harness.driver.surface_attrib(dpy, surface, egl::WIDTH, 1),
        Err(Error::BadAttribute)
    );
}

#[test]
fn test_swap_buffers_posts_window_frames() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let window = harness.platform.create_window(Size2D::new(100, 100));
    let surface = harness.driver.create_window_surface(dpy, config, window, &NO_ATTRIBS).unwrap();
    let pbuffer = harness.pbuffer(dpy);
    let ctx = harness.context(dpy);

    assert_eq!(harness.driver.swap_buffers(dpy, surface), Err(Error::BadContext));
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    harness.driver.swap_buffers(dpy, surface).unwrap();
    harness.platform.resize_window(window, Size2D::new(50, 60));
    harness.driver.swap_buffers(dpy, surface).unwrap();
    assert_eq!(harness.driver.swap_buffers(dpy, pbuffer), Err(Error::BadSurface));

    {
        let state = harness.driver.state.lock();
        let surface = state.surface(dpy, surface).unwrap();
        assert_eq!(surface.frames_posted(), 2);
        assert_eq!(surface.size, Size2D::new(50, 60));
    }
    let key = harness.driver.thread_key();
    let frames = harness.driver.threads.lock().get(key).and_then(|tstate| tstate.current_sync.as_ref().map(|sync| sync.frames));
    assert_eq!(frames, Some(2));

    harness.platform.destroy_window(window);
    assert_eq!(harness.driver.swap_buffers(dpy, surface), Err(Error::BadNativeWindow));

    harness.driver.lose_contexts(dpy).unwrap();
    assert_eq!(harness.driver.swap_buffers(dpy, surface), Err(Error::ContextLost));
}

#[test]
fn test_swap_interval_is_clamped() {
    let harness = Harness::new();
    harness.platform.set_vsync(false);
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);

    assert_eq!(harness.driver.swap_interval(dpy, 1), Err(Error::BadContext));
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    let interval = |harness: &Harness| {
        harness.driver.state.lock().surface(dpy, surface).map(|surface| surface.swap_interval)
    };
    assert_eq!(interval(&harness), Some(0));
    harness.driver.swap_interval(dpy, 10).unwrap();
    assert_eq!(interval(&harness), Some(4));
    harness.driver.swap_interval(dpy, -3).unwrap();
    assert_eq!(interval(&harness), Some(0));
}

#[test]
fn test_texture_binding_of_pbuffers() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let texture_attribs = [
        egl::WIDTH,
        32,
        egl::HEIGHT,
        32,
        egl::TEXTURE_FORMAT,
        egl::TEXTURE_RGBA,
        egl::TEXTURE_TARGET,
        egl::TEXTURE_2D,
        egl::NONE,
    ];
    let texture = harness.driver.create_pbuffer_surface(dpy, config, &texture_attribs).unwrap();
    let plain = harness.pbuffer(dpy);
    let ctx = harness.context(dpy);

    // Without a current context there is nothing to bind to.
    harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    assert_eq!(harness.gles.calls().bind_tex_image, 0);

    harness.driver.make_current(dpy, plain, plain, ctx).unwrap();
    assert_eq!(harness.driver.bind_tex_image(dpy, texture, egl::FALSE), Err(Error::BadParameter));
    assert_eq!(harness.driver.bind_tex_image(dpy, plain, egl::BACK_BUFFER), Err(Error::BadMatch));
    harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    assert_eq!(harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER), Err(Error::BadAccess));
    assert_eq!(harness.gles.calls().bind_tex_image, 1);

    harness.driver.release_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    assert_eq!(harness.driver.release_tex_image(dpy, texture, egl::BACK_BUFFER), Err(Error::BadAccess));
    assert_eq!(harness.gles.calls().release_tex_image, 1);

    // Destroying the context releases its texture images.
    harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    harness.driver.destroy_context(dpy, ctx).unwrap();
    let bound = harness.driver.state.lock().surface(dpy, texture).map(|surface| surface.is_bound);
    assert_eq!(bound, Some(false));
    assert_eq!(harness.gles.calls().release_tex_image, 2);
}

#[test]
fn test_texture_image_released_under_another_context() {
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let texture_attribs = [
        egl::TEXTURE_FORMAT,
        egl::TEXTURE_RGBA,
        egl::TEXTURE_TARGET,
        egl::TEXTURE_2D,
        egl::NONE,
    ];
    let texture = harness.driver.create_pbuffer_surface(dpy, config, &texture_attribs).unwrap();
    let plain = harness.pbuffer(dpy);
    let first = harness.context(dpy);
    let second = harness.context(dpy);

    harness.driver.make_current(dpy, plain, plain, first).unwrap();
    harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    harness.driver.make_current(dpy, plain, plain, second).unwrap();
    harness.driver.release_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    {
        let state = harness.driver.state.lock();
        assert_eq!(state.context(dpy, first).map(|context| context.bound_surfaces.len()), Some(0));
    }

    // The first context no longer owns the binding, so freeing it leaves the surface alone.
    harness.driver.bind_tex_image(dpy, texture, egl::BACK_BUFFER).unwrap();
    harness.driver.destroy_context(dpy, first).unwrap();
    let bound = harness.driver.state.lock().surface(dpy, texture).map(|surface| surface.is_bound);
    assert_eq!(bound, Some(true));
    assert_eq!(harness.gles.calls().release_tex_image, 1);
}

#[test]
fn test_images_belong_to_their_display() {
    let harness = Harness::new();
    let dpy = harness.display();
    let pixmap = harness.platform.create_pixmap(Size2D::new(4, 4));
    let preserved = [egl::IMAGE_PRESERVED_KHR, egl::TRUE, egl::NONE];

    let image = harness
        .driver
        .create_image(dpy, Handle::NONE, egl::NATIVE_PIXMAP_KHR, pixmap.0, &preserved)
        .unwrap();
    let ctx = harness.context(dpy);
    assert_eq!(
        harness.driver.create_image(dpy, ctx, egl::NATIVE_PIXMAP_KHR, pixmap.0, &NO_ATTRIBS),
        Err(Error::BadParameter)
    );
    assert_eq!(
        harness.driver.create_image(dpy, ctx, egl::GL_TEXTURE_2D_KHR, 0, &NO_ATTRIBS),
        Err(Error::BadParameter)
    );
    assert_eq!(
        harness.driver.create_image(dpy, Handle::NONE, egl::GL_TEXTURE_2D_KHR, 1, &NO_ATTRIBS),
        Err(Error::BadContext)
    );
    assert_eq!(
        harness.driver.create_image(dpy, Handle::NONE, 0x1234, pixmap.0, &NO_ATTRIBS),
        Err(Error::BadParameter)
    );
    let texture = harness.driver.create_image(dpy, ctx, egl::GL_TEXTURE_2D_KHR, 1, &NO_ATTRIBS).unwrap();
    assert_eq!(harness.driver.state.lock().images_owned(dpy), 2);

    harness.driver.destroy_image(dpy, image).unwrap();
    assert_eq!(harness.driver.destroy_image(dpy, image), Err(Error::BadParameter));

    // Bound through its source context, the texture image outlives terminate.
    let surface = harness.pbuffer(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();
    harness.driver.terminate(dpy).unwrap();
    assert!(harness.driver.state.lock().images.contains(texture));

    let none = Handle::NONE;
    harness.driver.make_current(dpy, none, none, none).unwrap();
    assert_eq!(harness.driver.state.lock().images_owned(dpy), 0);
    assert_eq!(harness.flags(dpy), DisplayFlags::empty());
}

#[test]
fn test_reusable_sync_objects() {
    let harness = Harness::new();
    let dpy = harness.display();

    assert_eq!(harness.driver.create_sync(dpy, 0x1234, &NO_ATTRIBS), Err(Error::BadAttribute));
    assert_eq!(
        harness.driver.create_sync(dpy, egl::SYNC_REUSABLE_KHR, &[egl::SYNC_STATUS_KHR, 1, egl::NONE]),
        Err(Error::BadAttribute)
    );
    let sync = harness.driver.create_sync(dpy, egl::SYNC_REUSABLE_KHR, &NO_ATTRIBS).unwrap();
    assert_eq!(harness.driver.get_sync_attrib(dpy, sync, egl::SYNC_STATUS_KHR), Ok(egl::UNSIGNALED_KHR));
    assert_eq!(
        harness.driver.get_sync_attrib(dpy, sync, egl::SYNC_TYPE_KHR),
        Ok(egl::SYNC_REUSABLE_KHR as EGLint)
    );

    harness.driver.signal_sync(dpy, sync, egl::SIGNALED_KHR).unwrap();
    assert_eq!(harness.driver.get_sync_attrib(dpy, sync, egl::SYNC_STATUS_KHR), Ok(egl::SIGNALED_KHR));
    assert_eq!(harness.driver.signal_sync(dpy, sync, egl::TRUE), Err(Error::BadParameter));
    assert_eq!(harness.driver.get_sync_attrib(dpy, sync, egl::WIDTH), Err(Error::BadAttribute));

    harness.driver.destroy_sync(dpy, sync).unwrap();
    assert_eq!(harness.driver.get_sync_attrib(dpy, sync, egl::SYNC_STATUS_KHR), Err(Error::BadParameter));

    let leftover = harness.driver.create_sync(dpy, egl::SYNC_REUSABLE_KHR, &NO_ATTRIBS).unwrap();
    harness.driver.terminate(dpy).unwrap();
    harness.driver.initialize(dpy).unwrap();
    assert_eq!(harness.driver.destroy_sync(dpy, leftover), Err(Error::BadParameter));
}

#[test]
fn test_unvalidated_destroy_context() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let key = harness.driver.thread_key();

    let mut state = harness.driver.state.lock();
    state.context_mut(dpy, ctx).unwrap().lifetime.mark_invalid();
    assert_eq!(state.destroy_context(None, dpy, ctx, key), Ok(()));
    assert!(state.context(dpy, ctx).is_none());
    drop(state);
    assert_eq!(harness.gles.live_contexts(), 0);
}

#[test]
fn test_dropping_the_driver_frees_everything() {
    let harness = Harness::new();
    let dpy = harness.display();
    let ctx = harness.context(dpy);
    let surface = harness.pbuffer(dpy);
    harness.context(dpy);
    harness.driver.make_current(dpy, surface, surface, ctx).unwrap();

    let Harness { platform, gles, vg, driver } = harness;
    drop(driver);
    assert_eq!(gles.live_contexts(), 0);
    assert_eq!(vg.live_contexts(), 0);
    assert!(!platform.is_device_open());
    assert_eq!(platform.init_count(platform.default_display()), 0);
}

#[test]
#[serial]
fn test_invalid_window_emits_resize_trace() {
    install_trace_capture();
    let harness = Harness::new();
    let dpy = harness.display();
    let config = harness.config(dpy);
    let window = harness.platform.create_window(Size2D::new(8, 8));
    let surface = harness.driver.create_window_surface(dpy, config, window, &NO_ATTRIBS).unwrap();
    let ctx = harness.context(dpy);

    harness.platform.destroy_window(window);
    assert_eq!(harness.driver.make_current(dpy, surface, surface, ctx), Err(Error::BadNativeWindow));

    let window = format!("{:?}", window);
    let records = TRACE_RECORDS.lock().unwrap_or_else(|err| err.into_inner());
    assert!(records.iter().any(|record| record.contains(&window) && record.contains("resized")));
}

// Threads randomly bind their own objects and fight over a shared context. Whatever the
// interleaving, every reference must be accounted for once everybody has let go.
#[test]
fn test_concurrent_make_current_stress() {
    const THREADS: usize = 6;
    const ITERATIONS: usize = 300;

    let harness = Harness::new();
    let dpy = harness.display();
    let shared = harness.context(dpy);
    let objects: Vec<(Handle, Handle, Handle)> = (0..THREADS)
        .map(|_| (harness.context(dpy), harness.pbuffer(dpy), harness.pbuffer(dpy)))
        .collect();
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for (index, &(ctx, a, b)) in objects.iter().enumerate() {
            let harness = &harness;
            let barrier = &barrier;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(0x5eed + index as u64);
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let result = match rng.gen_range(0..5) {
                        0 => harness.driver.make_current(dpy, a, b, ctx),
                        1 => harness.driver.make_current(dpy, b, a, ctx),
                        2 => harness.driver.make_current(dpy, a, a, ctx),
                        3 => harness.driver.make_current(dpy, a, b, shared),
                        _ => harness.driver.make_current(dpy, Handle::NONE, Handle::NONE, Handle::NONE),
                    };
                    match result {
                        Ok(()) | Err(Error::BadAccess) => {}
                        Err(err) => panic!("unexpected make_current failure: {:?}", err),
                    }
                }
                harness.driver.release_thread().unwrap();
            });
        }
    });

    assert_eq!(harness.context_refs(dpy, shared), Some(1));
    for &(ctx, a, b) in objects.iter() {
        assert_eq!(harness.context_refs(dpy, ctx), Some(1));
        assert_eq!(harness.surface_refs(dpy, a), Some(1));
        assert_eq!(harness.surface_refs(dpy, b), Some(1));
    }
    let state = harness.driver.state.lock();
    let tables = state.tables(dpy).unwrap();
    assert!(tables.contexts.iter().all(|(_, context)| !context.lifetime.is_current()));
    assert!(tables.surfaces.iter().all(|(_, surface)| !surface.lifetime.is_current()));
}
