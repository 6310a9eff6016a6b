use core::sync::atomic::{AtomicUsize, Ordering};

pub mod body;
pub mod cfg;
pub mod cmd;
pub mod descriptor;
pub mod executor;
mod histogram;
pub mod logging;
pub mod pool;
pub mod report;
pub mod runtime;
pub mod source;
pub mod stat;
pub mod transport;
mod worker;

/// Thread-safe producing iterators.
///
/// Unlike the [`Iterator`] this trait accepts `self` by reference and returns a
/// reference to the next item, not an [`Option`].
///
/// Think of it as an infinite thread-safe iterator.
pub trait Produce {
    /// The type of the elements being produced.
    type Item: ?Sized;

    /// Advances this producer and returns the next value.
    fn next(&self) -> &Self::Item;
}

/// Infinite cycle producing iterator, that yields the same value.
#[derive(Debug)]
pub struct OneProduce<T> {
    v: T,
}

impl<T> OneProduce<T> {
    /// Constructs a new [`OneProduce`] from the given value.
    #[inline]
    pub const fn new(v: T) -> Self {
        Self { v }
    }
}

impl<T> Produce for OneProduce<T> {
    type Item = T;

    #[inline]
    fn next(&self) -> &Self::Item {
        &self.v
    }
}

/// Thread-safe infinite cycle producing iterator over the given vector.
///
/// Values are yielded in order, wrapping around after the last one.
#[derive(Debug)]
pub struct VecProduce<T> {
    vec: Vec<T>,
    idx: AtomicUsize,
}

impl<T> VecProduce<T> {
    /// Constructs a new [`VecProduce`] from the given vector.
    ///
    /// Returns `None` if the vector is empty, because there is nothing to
    /// cycle through.
    #[inline]
    pub fn new(vec: Vec<T>) -> Option<Self> {
        if vec.is_empty() {
            return None;
        }

        Some(Self { vec, idx: AtomicUsize::new(0) })
    }
}

impl<T> Produce for VecProduce<T> {
    type Item = T;

    #[inline]
    fn next(&self) -> &Self::Item {
        // Increment the current value, returning the previous one.
        let idx = self.idx.fetch_add(1, Ordering::Relaxed);
        let idx = idx % self.vec.len();

        &self.vec[idx]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vec_produce_wraps_around() {
        let p = VecProduce::new(vec![0, 1, 2]).unwrap();
        let seq: Vec<i32> = (0..7).map(|_| *p.next()).collect();

        assert_eq!(vec![0, 1, 2, 0, 1, 2, 0], seq);
    }

    #[test]
    fn vec_produce_rejects_empty() {
        assert!(VecProduce::<u8>::new(Vec::new()).is_none());
    }

    #[test]
    fn one_produce_repeats() {
        let p = OneProduce::new("x");
        assert_eq!("x", *p.next());
        assert_eq!("x", *p.next());
    }
}
