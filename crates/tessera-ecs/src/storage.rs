//! Component storage - type-erased column storage for archetype tables.
//!
//! Each column stores components of a single type in a contiguous array,
//! enabling cache-friendly iteration. Columns only exist for sized
//! components; tags live in the signature alone.

use std::{alloc::Layout, ptr::NonNull};

use crate::component::ComponentInfo;

/// A column of components of a single type.
///
/// Stores components in a contiguous, type-erased array.
/// Manages its own memory allocation and deallocation.
pub struct Column {
    /// Pointer to the data array.
    data: NonNull<u8>,
    /// Number of components stored.
    len: usize,
    /// Allocated capacity (in number of components).
    capacity: usize,
    /// Component type information.
    info: ComponentInfo,
}

// SAFETY: Column manages its own memory and `Component` requires the stored
// type to be Send + Sync
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create a new empty column for the given component type.
    #[must_use]
    pub fn new(info: ComponentInfo) -> Self {
        debug_assert!(!info.is_tag(), "tags have no column");
        Self {
            data: NonNull::dangling(),
            len: 0,
            capacity: 0,
            info,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Push a component onto the column by copying its bytes.
    ///
    /// # Safety
    ///
    /// - `value` must point to a valid instance of the column's component type.
    /// - Ownership moves into the column; the caller must not drop `value`.
    pub unsafe fn push_raw(&mut self, value: *const u8) {
        self.reserve(1);

        // SAFETY: We just reserved space, so self.len is a valid index
        let dst = unsafe { self.get_unchecked_raw(self.len) };

        // SAFETY: dst is valid, value is valid, and they don't overlap
        unsafe {
            std::ptr::copy_nonoverlapping(value, dst, self.info.size());
        }

        self.len += 1;
    }

    /// Push a default built by `info`, which may carry a constructor
    /// registered after this column was created. Returns `false` (and
    /// pushes nothing) when `info` has no default constructor.
    pub fn push_default_from(&mut self, info: &ComponentInfo) -> bool {
        debug_assert_eq!(info.id(), self.info.id());
        if !info.has_default() {
            return false;
        }
        self.reserve(1);

        // SAFETY: reserved slot at self.len is valid for writes
        unsafe {
            let dst = self.get_unchecked_raw(self.len);
            info.write_default(dst);
        }

        self.len += 1;
        true
    }

    /// Push a typed component onto the column.
    pub fn push<T: 'static>(&mut self, value: T) {
        debug_assert!(self.info.is::<T>(), "Type mismatch in Column::push");

        // SAFETY: We verified the type matches
        unsafe {
            self.push_raw(std::ptr::from_ref(&value).cast());
        }

        // Ownership moved into the column
        std::mem::forget(value);
    }

    /// Drop the value at `index` and move the bytes at `value` into its place.
    ///
    /// # Safety
    ///
    /// - `index` must be less than `len`.
    /// - `value` must point to a valid instance of the column's component
    ///   type, whose ownership moves into the column.
    pub unsafe fn replace_raw(&mut self, index: usize, value: *const u8) {
        debug_assert!(index < self.len, "Index out of bounds in replace_raw");

        // SAFETY: Caller ensures index is valid
        unsafe {
            let dst = self.get_unchecked_raw(index);
            self.info.drop_in_place(dst);
            std::ptr::copy_nonoverlapping(value, dst, self.info.size());
        }
    }

    /// Remove the component at `index` without dropping it; its bytes must
    /// already have been copied elsewhere. The last element fills the hole.
    ///
    /// Returns the index of the element that was moved into `index`,
    /// or `None` if `index` was the last element.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn swap_remove_forget(&mut self, index: usize) -> Option<usize> {
        debug_assert!(index < self.len, "Index out of bounds in swap_remove");

        self.len -= 1;

        if index < self.len {
            // SAFETY: both indices are in bounds and distinct
            unsafe {
                let hole = self.get_unchecked_raw(index);
                let last = self.get_unchecked_raw(self.len);
                std::ptr::copy_nonoverlapping(last, hole, self.info.size());
            }
            Some(self.len)
        } else {
            None
        }
    }

    /// Remove and drop the component at the given index.
    /// Swaps with the last element for O(1) removal.
    ///
    /// Returns the index of the element that was moved into `index`,
    /// or `None` if `index` was the last element.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn swap_remove_drop(&mut self, index: usize) -> Option<usize> {
        debug_assert!(index < self.len, "Index out of bounds in swap_remove_drop");

        // SAFETY: ptr points to a valid initialized component
        unsafe {
            let ptr = self.get_unchecked_raw(index);
            self.info.drop_in_place(ptr);
            self.swap_remove_forget(index)
        }
    }

    /// Get a raw pointer to the component at the given index.
    ///
    /// # Safety
    ///
    /// `index` must be at most `len`, and below `capacity`.
    #[must_use]
    pub unsafe fn get_unchecked_raw(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len || (index == self.len && self.len < self.capacity));
        // SAFETY: Caller ensures index is valid
        unsafe { self.data.as_ptr().add(index * self.info.size()) }
    }

    /// Get a reference to the component at the given index.
    ///
    /// # Safety
    ///
    /// - `index` must be less than `len`.
    /// - `T` must match the column's component type.
    #[must_use]
    pub unsafe fn get_unchecked<T: 'static>(&self, index: usize) -> &T {
        debug_assert!(self.info.is::<T>(), "Type mismatch in Column::get");
        // SAFETY: Caller ensures index is valid and type matches
        unsafe { &*self.get_unchecked_raw(index).cast::<T>() }
    }

    /// Get a mutable reference to the component at the given index.
    ///
    /// # Safety
    ///
    /// - `index` must be less than `len`.
    /// - `T` must match the column's component type.
    #[must_use]
    pub unsafe fn get_unchecked_mut<T: 'static>(&mut self, index: usize) -> &mut T {
        debug_assert!(self.info.is::<T>(), "Type mismatch in Column::get_mut");
        // SAFETY: Caller ensures index is valid, type matches, and &mut self
        // rules out aliasing
        unsafe { &mut *self.get_unchecked_raw(index).cast::<T>() }
    }

    /// Pointer to the start of the data array.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Reserve capacity for at least `additional` more components.
    ///
    /// # Panics
    ///
    /// Panics if the required capacity overflows `usize`.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.len.checked_add(additional).expect("Capacity overflow");

        if required <= self.capacity {
            return;
        }

        self.grow(required);
    }

    /// Grow the column to at least `min_capacity`.
    fn grow(&mut self, min_capacity: usize) {
        // Double capacity, but at least 4 elements
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .unwrap_or(min_capacity)
            .max(min_capacity)
            .max(4);

        let new_layout = Self::array_layout(&self.info, new_capacity);

        // SAFETY: layout size is non-zero because tags never get a column
        let new_data = unsafe {
            let ptr = if self.capacity == 0 {
                std::alloc::alloc(new_layout)
            } else {
                let old_layout = Self::array_layout(&self.info, self.capacity);
                std::alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            };
            if ptr.is_null() {
                std::alloc::handle_alloc_error(new_layout);
            }
            NonNull::new_unchecked(ptr)
        };

        self.data = new_data;
        self.capacity = new_capacity;
    }

    /// Clear all components, dropping them.
    pub fn clear(&mut self) {
        if self.info.needs_drop() {
            for i in 0..self.len {
                // SAFETY: i is valid index pointing to an initialized component
                unsafe {
                    let ptr = self.get_unchecked_raw(i);
                    self.info.drop_in_place(ptr);
                }
            }
        }
        self.len = 0;
    }

    fn array_layout(info: &ComponentInfo, count: usize) -> Layout {
        let size = info.size().checked_mul(count).expect("Layout overflow");
        // SAFETY: align is always a power of 2 from Layout
        unsafe { Layout::from_size_align_unchecked(size, info.align()) }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();

        if self.capacity > 0 {
            let layout = Self::array_layout(&self.info, self.capacity);
            // SAFETY: data was allocated with this layout
            unsafe {
                std::alloc::dealloc(self.data.as_ptr(), layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::{Entity, Generation},
        id::Id,
    };

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Name(String);

    fn info<T: Send + Sync + 'static>() -> ComponentInfo {
        ComponentInfo::of::<T>(Id::entity(Entity::new(1, Generation::new())))
    }

    #[test]
    fn test_column_push_get() {
        let mut col = Column::new(info::<Position>());

        col.push(Position { x: 1.0, y: 2.0 });
        col.push(Position { x: 3.0, y: 4.0 });

        assert_eq!(col.len(), 2);

        // SAFETY: Valid indices and correct type
        unsafe {
            assert_eq!(
                col.get_unchecked::<Position>(0),
                &Position { x: 1.0, y: 2.0 }
            );
            assert_eq!(
                col.get_unchecked::<Position>(1),
                &Position { x: 3.0, y: 4.0 }
            );
        }
    }

    #[test]
    fn test_column_swap_remove_moves_last_into_hole() {
        let mut col = Column::new(info::<Position>());

        col.push(Position { x: 1.0, y: 2.0 });
        col.push(Position { x: 3.0, y: 4.0 });
        col.push(Position { x: 5.0, y: 6.0 });

        // SAFETY: Index 0 is valid
        let swapped = unsafe { col.swap_remove_drop(0) };

        assert_eq!(swapped, Some(2));
        assert_eq!(col.len(), 2);

        // SAFETY: Valid indices
        unsafe {
            assert_eq!(
                col.get_unchecked::<Position>(0),
                &Position { x: 5.0, y: 6.0 }
            );
            assert_eq!(
                col.get_unchecked::<Position>(1),
                &Position { x: 3.0, y: 4.0 }
            );
        }

        // SAFETY: Index 1 is the last element
        assert_eq!(unsafe { col.swap_remove_drop(1) }, None);
    }

    #[test]
    fn test_push_default_requires_constructor() {
        let mut col = Column::new(info::<Position>());
        assert!(!col.push_default_from(&info::<Position>()));
        assert!(col.is_empty());

        // A constructor registered after the column was created
        let defaulted = info::<Position>().with_default::<Position>();
        assert!(col.push_default_from(&defaulted));
        // SAFETY: index 0 was just initialized
        unsafe {
            assert_eq!(col.get_unchecked::<Position>(0), &Position::default());
        }
    }

    #[test]
    fn test_column_drop_counts() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropCounter(u8);

        impl Drop for DropCounter {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);

        {
            let mut col = Column::new(info::<DropCounter>());

            col.push(DropCounter(0));
            col.push(DropCounter(1));
            col.push(DropCounter(2));

            // Moving a value out must not drop it
            let mut moved = std::mem::MaybeUninit::<DropCounter>::uninit();
            // SAFETY: index 1 is valid; the bytes are copied out before removal
            unsafe {
                std::ptr::copy_nonoverlapping(
                    col.get_unchecked_raw(1),
                    moved.as_mut_ptr().cast::<u8>(),
                    std::mem::size_of::<DropCounter>(),
                );
                col.swap_remove_forget(1);
            }
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 0);

            // SAFETY: the bytes were moved out of the column
            drop(unsafe { moved.assume_init() });
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);

            let replacement = DropCounter(9);
            // SAFETY: index 0 is valid and ownership moves into the column
            unsafe { col.replace_raw(0, std::ptr::from_ref(&replacement).cast()) };
            std::mem::forget(replacement);
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2);
        }

        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_column_string() {
        let mut col = Column::new(info::<Name>());

        col.push(Name("Hello".to_string()));
        col.push(Name("World".to_string()));

        // SAFETY: Valid indices and correct type
        unsafe {
            assert_eq!(col.get_unchecked::<Name>(0).0, "Hello");
            assert_eq!(col.get_unchecked::<Name>(1).0, "World");
        }
    }
}
