//! Component type registration and metadata.
//!
//! Components are data types that can be attached to entities. Every
//! registered component type is itself an entity; its handle is the
//! [`Id`] used in signatures, and this registry keeps the runtime layout
//! needed to store values of it in type-erased columns.

use std::{alloc::Layout, any::TypeId, fmt};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::id::Id;

/// Marker trait for types that can be used as components.
///
/// Values are moved between tables with a bytewise copy, so types must be
/// safe to move in memory (no self-referential pointers).
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Runtime information about a component type.
#[derive(Clone)]
pub struct ComponentInfo {
    /// Id of the component entity.
    id: Id,
    /// Type name for debugging.
    name: &'static str,
    /// Memory layout of the component.
    layout: Layout,
    /// Function to drop a component in place.
    drop_fn: Option<unsafe fn(*mut u8)>,
    /// Function writing `T::default()` to uninitialized memory.
    default_fn: Option<unsafe fn(*mut u8)>,
    /// Rust TypeId for type checking.
    type_id: TypeId,
}

impl ComponentInfo {
    /// Create component info for a concrete type.
    #[must_use]
    pub fn of<T: Component>(id: Id) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) })
            } else {
                None
            },
            default_fn: None,
            type_id: TypeId::of::<T>(),
        }
    }

    /// Add a default constructor, so the component can be added without a
    /// value.
    #[must_use]
    pub fn with_default<T: Component + Default>(mut self) -> Self {
        debug_assert!(self.is::<T>());
        self.default_fn = Some(|ptr| unsafe { ptr.cast::<T>().write(T::default()) });
        self
    }

    #[must_use]
    pub const fn id(&self) -> Id {
        self.id
    }

    /// Full type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path or generic arguments.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    #[must_use]
    pub const fn align(&self) -> usize {
        self.layout.align()
    }

    /// Zero-sized components are tags and get no column.
    #[must_use]
    pub const fn is_tag(&self) -> bool {
        self.layout.size() == 0
    }

    #[must_use]
    pub const fn needs_drop(&self) -> bool {
        self.drop_fn.is_some()
    }

    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default_fn.is_some()
    }

    /// Drop a component at the given pointer.
    ///
    /// # Safety
    ///
    /// - `ptr` must point to a valid, initialized instance of this component type.
    /// - The memory at `ptr` must not be accessed after this call.
    pub unsafe fn drop_in_place(&self, ptr: *mut u8) {
        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(ptr) };
        }
    }

    /// Write the default value to `ptr`. Returns `false` when the type was
    /// registered without one.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes and aligned for this component type.
    pub unsafe fn write_default(&self, ptr: *mut u8) -> bool {
        match self.default_fn {
            Some(default_fn) => {
                unsafe { default_fn(ptr) };
                true
            }
            None => false,
        }
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

/// Registry for component types.
///
/// Maps Rust types to component ids and ids to layout metadata. Ids without
/// an entry here are plain tags.
#[derive(Default)]
pub struct ComponentRegistry {
    type_to_id: HashMap<TypeId, Id, FxBuildHasher>,
    infos: HashMap<Id, ComponentInfo, FxBuildHasher>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `info` for its id. Replaces previous metadata for the same type.
    pub fn insert(&mut self, info: ComponentInfo) {
        self.type_to_id.insert(info.type_id, info.id);
        self.infos.insert(info.id, info);
    }

    /// Attach a default constructor to an already registered type.
    pub fn enable_default<T: Component + Default>(&mut self) {
        let Some(id) = self.get_id::<T>() else {
            return;
        };
        if let Some(info) = self.infos.get_mut(&id) {
            if !info.has_default() {
                *info = info.clone().with_default::<T>();
            }
        }
    }

    /// Get the component id for a type, if registered.
    #[must_use]
    pub fn get_id<T: Component>(&self) -> Option<Id> {
        self.type_to_id.get(&TypeId::of::<T>()).copied()
    }

    /// Get component info by id. Pairs use their relation's metadata.
    #[must_use]
    pub fn get_info(&self, id: Id) -> Option<&ComponentInfo> {
        self.infos.get(&id)
    }

    /// Drop metadata for an id whose entity was deleted.
    pub fn forget(&mut self, id: Id) -> Option<ComponentInfo> {
        let info = self.infos.remove(&id)?;
        self.type_to_id.remove(&info.type_id);
        Some(info)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.values()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .finish()
    }
}
