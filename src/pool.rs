//! Reusable scratch-buffer pools.
//!
//! Query execution needs several large scratch vectors (candidate ids,
//! per-object counters, sort buffers, combination keys). Allocating them
//! per query would dominate short searches, so each index keeps pools of
//! preallocated buffers shared by all searching threads. A loan is an RAII
//! handle: the buffer goes back to the pool when the handle drops, on every
//! exit path including panics.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// A multi-producer pool of reusable `Vec<T>` buffers.
///
/// The pool grows on demand and never shrinks; buffers keep whatever
/// capacity their last user grew them to.
#[derive(Debug)]
pub struct VectorPool<T> {
    free: Mutex<Vec<Vec<T>>>,
    default_capacity: usize,
}

impl<T> VectorPool<T> {
    /// Create a pool preloaded with `initial_buffers` buffers of
    /// `default_capacity` elements each.
    pub fn new(initial_buffers: usize, default_capacity: usize) -> Self {
        let free = (0..initial_buffers)
            .map(|_| Vec::with_capacity(default_capacity))
            .collect();
        Self {
            free: Mutex::new(free),
            default_capacity,
        }
    }

    /// Borrow a cleared buffer, allocating a fresh one if the pool is empty.
    pub fn loan(&self) -> PoolLoan<'_, T> {
        let mut buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.default_capacity));
        buf.clear();
        PoolLoan {
            pool: self,
            buf: Some(buf),
        }
    }

    /// Buffers currently available for loan.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn give_back(&self, buf: Vec<T>) {
        self.free.lock().push(buf);
    }
}

/// RAII handle to a pooled buffer; derefs to the underlying `Vec<T>`.
#[derive(Debug)]
pub struct PoolLoan<'a, T> {
    pool: &'a VectorPool<T>,
    buf: Option<Vec<T>>,
}

impl<T> Deref for PoolLoan<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        self.buf.as_ref().unwrap_or_else(|| unreachable!("loan is live until drop"))
    }
}

impl<T> DerefMut for PoolLoan<'_, T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        self.buf.as_mut().unwrap_or_else(|| unreachable!("loan is live until drop"))
    }
}

impl<T> Drop for PoolLoan<'_, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_and_return() {
        let pool: VectorPool<u32> = VectorPool::new(2, 16);
        assert_eq!(pool.idle(), 2);
        {
            let mut a = pool.loan();
            let b = pool.loan();
            assert_eq!(pool.idle(), 0);
            a.push(1);
            assert!(b.is_empty());
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn grows_past_initial_size() {
        let pool: VectorPool<u8> = VectorPool::new(1, 4);
        let a = pool.loan();
        let b = pool.loan();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn loaned_buffer_is_cleared_but_keeps_capacity() {
        let pool: VectorPool<u32> = VectorPool::new(1, 4);
        {
            let mut a = pool.loan();
            a.extend(0..100);
        }
        let a = pool.loan();
        assert!(a.is_empty());
        assert!(a.capacity() >= 100);
    }

    #[test]
    fn returns_buffer_on_panic() {
        let pool: VectorPool<u32> = VectorPool::new(1, 4);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _loan = pool.loan();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }
}
