// Scoped acquisition guard
//
// Wraps a freshly acquired resource together with the code that releases it.
// If the surrounding function bails out with `?` the guard drops and the
// resource is released; once every later step has succeeded the caller takes
// the value back out with `Guard::into_inner`.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

pub struct Guard<T, F: FnOnce(T)> {
    value: ManuallyDrop<T>,
    release: ManuallyDrop<F>,
}

impl<T, F: FnOnce(T)> Guard<T, F> {
    pub fn new(value: T, release: F) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            release: ManuallyDrop::new(release),
        }
    }

    /// Disarm the guard and hand back the resource.
    pub fn into_inner(guard: Self) -> T {
        let mut guard = ManuallyDrop::new(guard);
        // Safety: `guard` is never dropped, so each field is taken exactly once.
        unsafe {
            ManuallyDrop::drop(&mut guard.release);
            ManuallyDrop::take(&mut guard.value)
        }
    }
}

impl<T, F: FnOnce(T)> Deref for Guard<T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F: FnOnce(T)> DerefMut for Guard<T, F> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, F: FnOnce(T)> Drop for Guard<T, F> {
    fn drop(&mut self) {
        // Safety: drop runs once and into_inner bypasses it.
        let (value, release) = unsafe {
            (
                ManuallyDrop::take(&mut self.value),
                ManuallyDrop::take(&mut self.release),
            )
        };
        release(value);
    }
}
