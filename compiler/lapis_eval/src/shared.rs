//! Shared mutable cells.
//!
//! The evaluator is single-threaded; aliased mutable state (object instances,
//! array storage, by-ref parameter cells, environment scopes) lives in
//! `Rc<RefCell<T>>`. `Shared<T>` wraps that with the small API the engine
//! actually uses, so the aliasing shows up in type signatures instead of as
//! raw `Rc<RefCell<..>>` spelled out at every site.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// A shared, interior-mutable cell.
///
/// `Clone` is a cheap handle copy; all clones alias the same value.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T> Shared<T> {
    /// Wrap a value in a fresh cell.
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    /// Immutably borrow the value.
    ///
    /// # Panics
    /// Panics if the cell is mutably borrowed.
    #[inline]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrow the value.
    ///
    /// # Panics
    /// Panics if the cell is already borrowed.
    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Replace the contents, returning the previous value.
    #[inline]
    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    /// Whether two handles alias the same cell.
    #[inline]
    pub fn ptr_eq(a: &Shared<T>, b: &Shared<T>) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Clone the contained value out of the cell.
    #[inline]
    pub fn get_clone(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}
