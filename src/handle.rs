// egl-runtime/src/handle.rs
//
//! Opaque, type-tagged handles and the tables that resolve them.
//!
//! A handle is a 32-bit value. The three most significant bits carry the resource type, the
//! remaining bits name a slot in the table of that type plus a generation counter for the slot.
//! Freed slots are recycled lowest-first, and the generation makes sure a handle to the previous
//! occupant of a slot no longer resolves. The generation has 13 bits; a slot whose generation
//! is exhausted is retired for the life of the table instead of wrapping, so no stale handle can
//! ever alias a newer object.

use crate::config::Config;
use crate::context::Context;
use crate::display::Display;
use crate::driver::DriverState;
use crate::image::Image;
use crate::surface::Surface;
use crate::sync::SyncObject;
use crate::Error;

use log::debug;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

const TAG_SHIFT: u32 = 29;
const TAG_MASK: u32 = 0b111 << TAG_SHIFT;
const GENERATION_SHIFT: u32 = 16;
const GENERATION_MASK: u32 = 0x1fff;
const INDEX_MASK: u32 = 0xffff;

/// The largest number of live entries a single table can hold.
pub const MAX_TABLE_CAPACITY: usize = INDEX_MASK as usize;

/// An opaque handle naming a display, surface, context, config, image or sync object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

/// The resource type encoded in the tag bits of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleType {
    Display,
    Surface,
    Context,
    Config,
    Image,
    Sync,
}

pub type DisplayHandle = Handle;
pub type SurfaceHandle = Handle;
pub type ContextHandle = Handle;
pub type ConfigHandle = Handle;
pub type ImageHandle = Handle;
pub type SyncHandle = Handle;

impl HandleType {
    #[inline]
    fn tag(self) -> u32 {
        match self {
            HandleType::Display => 0b000,
            HandleType::Surface => 0b010,
            HandleType::Context => 0b100,
            HandleType::Config => 0b110,
            HandleType::Image => 0b001,
            HandleType::Sync => 0b011,
        }
    }

    fn from_tag(tag: u32) -> Option<HandleType> {
        match tag {
            0b000 => Some(HandleType::Display),
            0b010 => Some(HandleType::Surface),
            0b100 => Some(HandleType::Context),
            0b110 => Some(HandleType::Config),
            0b001 => Some(HandleType::Image),
            0b011 => Some(HandleType::Sync),
            _ => None,
        }
    }
}

impl Handle {
    /// The "no handle" sentinel. It is not a valid handle of any type.
    pub const NONE: Handle = Handle(0);

    fn new(kind: HandleType, index: usize, generation: u32) -> Handle {
        debug_assert!(index < MAX_TABLE_CAPACITY);
        Handle(
            (kind.tag() << TAG_SHIFT)
                | ((generation & GENERATION_MASK) << GENERATION_SHIFT)
                | (index as u32 + 1),
        )
    }

    /// Reinterprets a raw value received from an application.
    #[inline]
    pub fn from_raw(raw: u32) -> Handle {
        Handle(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for the sentinel, `Some(self)` otherwise.
    #[inline]
    pub fn to_option(self) -> Option<Handle> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    /// The resource type named by the tag bits. This says nothing about whether the handle is
    /// live.
    pub fn kind(self) -> Option<HandleType> {
        if self.is_none() {
            return None;
        }
        HandleType::from_tag((self.0 & TAG_MASK) >> TAG_SHIFT)
    }

    #[inline]
    fn slot(self) -> Option<usize> {
        match self.0 & INDEX_MASK {
            0 => None,
            index => Some(index as usize - 1),
        }
    }

    #[inline]
    fn generation(self) -> u32 {
        (self.0 >> GENERATION_SHIFT) & GENERATION_MASK
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.kind() {
            None if self.is_none() => write!(f, "Handle(NONE)"),
            None => write!(f, "Handle(invalid {:#010x})", self.0),
            Some(kind) => write!(f, "{:?}({:#010x})", kind, self.0),
        }
    }
}

struct Slot<T> {
    generation: u32,
    retired: bool,
    value: Option<T>,
}

impl<T> Slot<T> {
    #[inline]
    fn is_free(&self) -> bool {
        self.value.is_none() && !self.retired
    }
}

/// A table mapping handles of one resource type to the objects they name.
pub(crate) struct HandleTable<T> {
    kind: HandleType,
    slots: Vec<Slot<T>>,
    len: usize,
    capacity: usize,
}

impl<T> HandleTable<T> {
    pub(crate) fn new(kind: HandleType, capacity: usize) -> HandleTable<T> {
        HandleTable {
            kind,
            slots: Vec::new(),
            len: 0,
            capacity: capacity.min(MAX_TABLE_CAPACITY),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` in the lowest free slot and returns its handle.
    ///
    /// Fails with `BadAlloc` when the table is full or growing it fails; the table is left
    /// untouched in that case.
    pub(crate) fn insert(&mut self, value: T) -> Result<Handle, Error> {
        let index = match self.slots.iter().position(Slot::is_free) {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.capacity {
                    return Err(Error::BadAlloc);
                }
                self.slots.try_reserve(1).map_err(|_| Error::BadAlloc)?;
                self.slots.push(Slot { generation: 0, retired: false, value: None });
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.len += 1;
        Ok(Handle::new(self.kind, index, slot.generation))
    }

    // A handle of another type, an out-of-range slot and a stale generation all miss.
    fn index_of(&self, handle: Handle) -> Option<usize> {
        if handle.kind() != Some(self.kind) {
            return None;
        }
        let index = handle.slot()?;
        let slot = self.slots.get(index)?;
        if slot.generation != handle.generation() || slot.value.is_none() {
            return None;
        }
        Some(index)
    }

    #[inline]
    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.index_of(handle).is_some()
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        let index = self.index_of(handle)?;
        self.slots[index].value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let index = self.index_of(handle)?;
        self.slots[index].value.as_mut()
    }

    /// Removes the entry and hands the object back to the caller. The object itself is not
    /// released here.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = self.index_of(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take();
        if slot.generation == GENERATION_MASK {
            slot.retired = true;
            debug!("Retired {:?} slot {}", self.kind, index);
        } else {
            slot.generation += 1;
        }
        self.len -= 1;
        value
    }

    /// Snapshot of the live handles, in slot order.
    pub(crate) fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        let kind = self.kind;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(kind, index, slot.generation), value))
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        let kind = self.kind;
        self.slots.iter_mut().enumerate().filter_map(move |(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(kind, index, generation), value))
        })
    }

    pub(crate) fn find<F>(&self, mut predicate: F) -> Option<Handle>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter()
            .find(|&(_, value)| predicate(value))
            .map(|(handle, _)| handle)
    }
}

/// The four per-display collections.
pub(crate) struct DisplayTables {
    pub(crate) configs: HandleTable<Arc<Config>>,
    pub(crate) contexts: HandleTable<Context>,
    pub(crate) surfaces: HandleTable<Surface>,
    pub(crate) syncs: HandleTable<SyncObject>,
}

impl DisplayTables {
    pub(crate) fn new(capacity: usize) -> DisplayTables {
        DisplayTables {
            configs: HandleTable::new(HandleType::Config, capacity),
            contexts: HandleTable::new(HandleType::Context, capacity),
            surfaces: HandleTable::new(HandleType::Surface, capacity),
            syncs: HandleTable::new(HandleType::Sync, capacity),
        }
    }
}

/// Gives the display its per-display tables. Any tables the display already had are kept.
pub(crate) fn create_handle_tables(display: &mut Display, capacity: usize) {
    if display.tables.is_none() {
        display.tables = Some(DisplayTables::new(capacity));
    }
}

// Checked lookups. Each one resolves a handle, rejects objects that have been tagged invalid,
// and reports the error matching the handle's type.
impl DriverState {
    pub(crate) fn check_display(&self, dpy: Handle) -> Result<&Display, Error> {
        self.displays.get(dpy).ok_or(Error::BadDisplay)
    }

    pub(crate) fn check_display_mut(&mut self, dpy: Handle) -> Result<&mut Display, Error> {
        self.displays.get_mut(dpy).ok_or(Error::BadDisplay)
    }

    /// Resolves a display that must be initialized and not terminating.
    pub(crate) fn check_display_ready(&self, dpy: Handle) -> Result<&Display, Error> {
        let display = self.check_display(dpy)?;
        if !display.is_initialized() || display.is_terminating() {
            return Err(Error::NotInitialized);
        }
        Ok(display)
    }

    pub(crate) fn tables(&self, dpy: Handle) -> Option<&DisplayTables> {
        self.displays.get(dpy)?.tables.as_ref()
    }

    pub(crate) fn tables_mut(&mut self, dpy: Handle) -> Option<&mut DisplayTables> {
        self.displays.get_mut(dpy)?.tables.as_mut()
    }

    pub(crate) fn check_config(&self, dpy: Handle, config: Handle) -> Result<Arc<Config>, Error> {
        self.tables(dpy)
            .and_then(|tables| tables.configs.get(config))
            .cloned()
            .ok_or(Error::BadConfig)
    }

    pub(crate) fn check_context(&self, dpy: Handle, ctx: Handle) -> Result<&Context, Error> {
        self.tables(dpy)
            .and_then(|tables| tables.contexts.get(ctx))
            .filter(|context| context.lifetime.is_valid())
            .ok_or(Error::BadContext)
    }

    pub(crate) fn check_surface(&self, dpy: Handle, surface: Handle) -> Result<&Surface, Error> {
        self.tables(dpy)
            .and_then(|tables| tables.surfaces.get(surface))
            .filter(|surface| surface.lifetime.is_valid())
            .ok_or(Error::BadSurface)
    }

    pub(crate) fn check_sync(&self, dpy: Handle, sync: Handle) -> Result<&SyncObject, Error> {
        self.tables(dpy)
            .and_then(|tables| tables.syncs.get(sync))
            .ok_or(Error::BadParameter)
    }

    pub(crate) fn check_image(&self, dpy: Handle, image: Handle) -> Result<&Image, Error> {
        self.images
            .get(image)
            .filter(|image| image.display == dpy)
            .ok_or(Error::BadParameter)
    }

    /// Unchecked lookups used by the binding code, which holds counted references to objects
    /// that may already be tagged invalid.
    pub(crate) fn context(&self, dpy: Handle, ctx: Handle) -> Option<&Context> {
        self.tables(dpy)?.contexts.get(ctx)
    }

    pub(crate) fn context_mut(&mut self, dpy: Handle, ctx: Handle) -> Option<&mut Context> {
        self.tables_mut(dpy)?.contexts.get_mut(ctx)
    }

    pub(crate) fn surface(&self, dpy: Handle, surface: Handle) -> Option<&Surface> {
        self.tables(dpy)?.surfaces.get(surface)
    }

    pub(crate) fn surface_mut(&mut self, dpy: Handle, surface: Handle) -> Option<&mut Surface> {
        self.tables_mut(dpy)?.surfaces.get_mut(surface)
    }

    /// Drops a display's per-display tables and, if `free_display` is set, its own entry in the
    /// display table. Returns `false` if the display was not registered.
    pub(crate) fn remove_display(&mut self, dpy: Handle, free_display: bool) -> bool {
        let display = match self.displays.get_mut(dpy) {
            Some(display) => display,
            None => {
                debug!("Display {:?} was not in the display table", dpy);
                return false;
            }
        };
        display.tables = None;
        if free_display {
            self.displays.remove(dpy);
        }
        true
    }
}
