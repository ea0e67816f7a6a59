//! Fixed-size buffers with a guard element past the logical end.
//!
//! Slices handed out are bounds checked; the guard only matters where memory is
//! written from outside Rust (the kernel filling a transfer buffer) or through
//! an FFT backend, and is checked with a debug assertion after those writes.

use std::fmt::Debug;

#[derive(Clone, Debug)]
pub struct GuardedBuffer<T> {
    data: Box<[T]>,
    guard: T,
}

impl<T: Copy + PartialEq + Debug> GuardedBuffer<T> {
    pub fn new(len: usize, fill: T, guard: T) -> Self {
        let mut data = vec![fill; len + 1];
        data[len] = guard;
        Self {
            data: data.into_boxed_slice(),
            guard,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[T] {
        let len = self.len();
        &self.data[..len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        &mut self.data[..len]
    }

    pub fn is_intact(&self) -> bool {
        self.data[self.len()] == self.guard
    }

    /// Panics in debug builds if anything wrote past the logical end.
    pub fn debug_check(&self) {
        debug_assert!(
            self.is_intact(),
            "buffer overrun: guard {:?} replaced by {:?}",
            self.guard,
            self.data[self.len()]
        );
    }
}
