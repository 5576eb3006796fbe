// egl-runtime/src/egl.rs
//
//! EGL enumerants used in attribute lists, queries and error codes.
//!
//! Values match the Khronos `egl.h` and `eglext.h` headers.

#![allow(missing_docs)]

pub type EGLint = i32;
pub type EGLenum = u32;

pub const FALSE: EGLint = 0;
pub const TRUE: EGLint = 1;

// Errors
pub const SUCCESS: EGLint = 0x3000;
pub const NOT_INITIALIZED: EGLint = 0x3001;
pub const BAD_ACCESS: EGLint = 0x3002;
pub const BAD_ALLOC: EGLint = 0x3003;
pub const BAD_ATTRIBUTE: EGLint = 0x3004;
pub const BAD_CONFIG: EGLint = 0x3005;
pub const BAD_CONTEXT: EGLint = 0x3006;
pub const BAD_CURRENT_SURFACE: EGLint = 0x3007;
pub const BAD_DISPLAY: EGLint = 0x3008;
pub const BAD_MATCH: EGLint = 0x3009;
pub const BAD_NATIVE_PIXMAP: EGLint = 0x300A;
pub const BAD_NATIVE_WINDOW: EGLint = 0x300B;
pub const BAD_PARAMETER: EGLint = 0x300C;
pub const BAD_SURFACE: EGLint = 0x300D;
pub const CONTEXT_LOST: EGLint = 0x300E;

// Config attributes
pub const BUFFER_SIZE: EGLint = 0x3020;
pub const ALPHA_SIZE: EGLint = 0x3021;
pub const BLUE_SIZE: EGLint = 0x3022;
pub const GREEN_SIZE: EGLint = 0x3023;
pub const RED_SIZE: EGLint = 0x3024;
pub const DEPTH_SIZE: EGLint = 0x3025;
pub const STENCIL_SIZE: EGLint = 0x3026;
pub const CONFIG_CAVEAT: EGLint = 0x3027;
pub const CONFIG_ID: EGLint = 0x3028;
pub const MAX_PBUFFER_HEIGHT: EGLint = 0x302A;
pub const MAX_PBUFFER_PIXELS: EGLint = 0x302B;
pub const MAX_PBUFFER_WIDTH: EGLint = 0x302C;
pub const NATIVE_RENDERABLE: EGLint = 0x302D;
pub const NATIVE_VISUAL_ID: EGLint = 0x302E;
pub const SAMPLES: EGLint = 0x3031;
pub const SAMPLE_BUFFERS: EGLint = 0x3032;
pub const SURFACE_TYPE: EGLint = 0x3033;
pub const NONE: EGLint = 0x3038;
pub const BIND_TO_TEXTURE_RGB: EGLint = 0x3039;
pub const BIND_TO_TEXTURE_RGBA: EGLint = 0x303A;
pub const MIN_SWAP_INTERVAL: EGLint = 0x303B;
pub const MAX_SWAP_INTERVAL: EGLint = 0x303C;
pub const LUMINANCE_SIZE: EGLint = 0x303D;
pub const ALPHA_MASK_SIZE: EGLint = 0x303E;
pub const COLOR_BUFFER_TYPE: EGLint = 0x303F;
pub const RENDERABLE_TYPE: EGLint = 0x3040;
pub const CONFORMANT: EGLint = 0x3042;

pub const DONT_CARE: EGLint = -1;

pub const SLOW_CONFIG: EGLint = 0x3050;
pub const NON_CONFORMANT_CONFIG: EGLint = 0x3051;

// Config attribute values
pub const RGB_BUFFER: EGLint = 0x308E;
pub const LUMINANCE_BUFFER: EGLint = 0x308F;

pub const PBUFFER_BIT: EGLint = 0x0001;
pub const PIXMAP_BIT: EGLint = 0x0002;
pub const WINDOW_BIT: EGLint = 0x0004;

pub const OPENGL_ES_BIT: EGLint = 0x0001;
pub const OPENVG_BIT: EGLint = 0x0002;
pub const OPENGL_ES2_BIT: EGLint = 0x0004;

// Query strings
pub const VENDOR: EGLint = 0x3053;
pub const VERSION: EGLint = 0x3054;
pub const EXTENSIONS: EGLint = 0x3055;
pub const CLIENT_APIS: EGLint = 0x308D;

// Surface attributes
pub const HEIGHT: EGLint = 0x3056;
pub const WIDTH: EGLint = 0x3057;
pub const LARGEST_PBUFFER: EGLint = 0x3058;
pub const DRAW: EGLint = 0x3059;
pub const READ: EGLint = 0x305A;
pub const CORE_NATIVE_ENGINE: EGLint = 0x305B;
pub const NO_TEXTURE: EGLint = 0x305C;
pub const TEXTURE_RGB: EGLint = 0x305D;
pub const TEXTURE_RGBA: EGLint = 0x305E;
pub const TEXTURE_2D: EGLint = 0x305F;
pub const TEXTURE_FORMAT: EGLint = 0x3080;
pub const TEXTURE_TARGET: EGLint = 0x3081;
pub const MIPMAP_TEXTURE: EGLint = 0x3082;
pub const MIPMAP_LEVEL: EGLint = 0x3083;
pub const BACK_BUFFER: EGLint = 0x3084;
pub const SINGLE_BUFFER: EGLint = 0x3085;
pub const RENDER_BUFFER: EGLint = 0x3086;
pub const VG_COLORSPACE: EGLint = 0x3087;
pub const VG_ALPHA_FORMAT: EGLint = 0x3088;
pub const SWAP_BEHAVIOR: EGLint = 0x3093;
pub const BUFFER_PRESERVED: EGLint = 0x3094;
pub const BUFFER_DESTROYED: EGLint = 0x3095;
pub const OPENVG_IMAGE: EGLenum = 0x3096;

// Context attributes
pub const CONTEXT_CLIENT_TYPE: EGLint = 0x3097;
pub const CONTEXT_CLIENT_VERSION: EGLint = 0x3098;
pub const OPENGL_ES_API: EGLenum = 0x30A0;
pub const OPENVG_API: EGLenum = 0x30A1;

// EGL_EXT_create_context_robustness
pub const CONTEXT_OPENGL_ROBUST_ACCESS_EXT: EGLint = 0x30BF;
pub const CONTEXT_OPENGL_RESET_NOTIFICATION_STRATEGY_EXT: EGLint = 0x3138;
pub const NO_RESET_NOTIFICATION_EXT: EGLint = 0x31BE;
pub const LOSE_CONTEXT_ON_RESET_EXT: EGLint = 0x31BF;

// EGL_KHR_image_base / EGL_KHR_image_pixmap / EGL_KHR_gl_texture_2D_image
pub const NATIVE_PIXMAP_KHR: EGLenum = 0x30B0;
pub const GL_TEXTURE_2D_KHR: EGLenum = 0x30B1;
pub const IMAGE_PRESERVED_KHR: EGLint = 0x30D2;

// EGL_KHR_reusable_sync
pub const SYNC_STATUS_KHR: EGLint = 0x30F1;
pub const SIGNALED_KHR: EGLint = 0x30F2;
pub const UNSIGNALED_KHR: EGLint = 0x30F3;
pub const SYNC_TYPE_KHR: EGLint = 0x30F7;
pub const SYNC_REUSABLE_KHR: EGLenum = 0x30FA;
