//! Reusable byte buffers.

use core::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;
use parking_lot::Mutex;

/// Pool of byte buffers used to encode request bodies.
///
/// Buffers are checked out with [`BufferPool::acquire`] and returned when the
/// guard is dropped, so every exit path (including errors and early returns)
/// releases exactly once.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    /// Initial capacity of freshly allocated buffers.
    capacity: usize,
    /// Number of buffers currently checked out.
    outstanding: AtomicUsize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Checks out an empty buffer, allocating a new one if the pool is empty.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self.free.lock().pop().unwrap_or_else(|| BytesMut::with_capacity(self.capacity));
        self.outstanding.fetch_add(1, Ordering::Relaxed);

        PooledBuf { buf: Some(buf), pool: self }
    }

    /// Returns the number of buffers checked out and not yet released.
    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Returns the number of idle buffers kept by the pool.
    #[cfg(test)]
    pub fn num_free(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        self.free.lock().push(buf);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Buffer checked out from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuf<'a> {
    // Always `Some` until dropped.
    buf: Option<BytesMut>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuf<'_> {
    type Target = BytesMut;

    #[inline]
    fn deref(&self) -> &Self::Target {
        match &self.buf {
            Some(buf) => buf,
            None => unreachable!("buffer is taken only on drop"),
        }
    }
}

impl DerefMut for PooledBuf<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.buf {
            Some(buf) => buf,
            None => unreachable!("buffer is taken only on drop"),
        }
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn release_on_drop() {
        let pool = BufferPool::new(16);
        {
            let mut a = pool.acquire();
            let b = pool.acquire();
            a.extend_from_slice(b"hello");

            assert_eq!(2, pool.outstanding());
            assert_eq!(5, a.len());
            assert!(b.is_empty());
        }

        assert_eq!(0, pool.outstanding());
        assert_eq!(2, pool.num_free());
    }

    #[test]
    fn reused_buffers_are_empty() {
        let pool = BufferPool::new(16);
        pool.acquire().extend_from_slice(b"payload");

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 7);
        assert_eq!(0, pool.num_free());
    }

    #[test]
    fn release_on_error_path() {
        fn fail(pool: &BufferPool) -> Result<(), &'static str> {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"x");
            Err("boom")
        }

        let pool = BufferPool::new(16);
        assert!(fail(&pool).is_err());
        assert_eq!(0, pool.outstanding());
    }
}
