//! Synthetic upload payloads.
//!
//! Bodies are generated on the fly instead of being read from files, so that
//! upload benchmarks are not bound by the local disk.

use core::cmp;
use std::{
    io::{self, Read, Write},
    sync::OnceLock,
};

use rand::{rngs::SmallRng, RngCore, SeedableRng};

/// Size of the buffer shared by all [`SyntheticBody::write_to`] calls.
const SHARED_LEN: usize = 64 * 1024;

/// Length of the id prefix.
const ID_LEN: usize = 8;

fn shared() -> &'static [u8] {
    static SHARED: OnceLock<Box<[u8]>> = OnceLock::new();

    SHARED.get_or_init(|| {
        let mut buf = vec![0; SHARED_LEN].into_boxed_slice();
        SmallRng::from_entropy().fill_bytes(&mut buf);
        buf
    })
}

/// Deterministic-size byte stream of pseudo-random content.
///
/// The first 8 bytes of the stream encode the `id` in little-endian order,
/// so that a stored payload can be traced back to the call that produced it.
/// The rest is drawn from the given random source.
#[derive(Debug)]
pub struct SyntheticBody<'a, R> {
    id: u64,
    /// Number of bytes still to be produced.
    size: u64,
    /// Number of bytes already produced.
    pos: u64,
    rng: &'a mut R,
}

impl<'a, R> SyntheticBody<'a, R>
where
    R: RngCore,
{
    pub fn new(id: u64, size: u64, rng: &'a mut R) -> Self {
        Self { id, size, pos: 0, rng }
    }

    /// Returns the number of bytes left in this stream.
    #[cfg(test)]
    pub fn remaining(&self) -> u64 {
        self.size
    }

    /// Writes all remaining bytes into the given sink.
    ///
    /// Unlike [`Read`], the payload after the id prefix is taken from a
    /// process-wide random buffer, avoiding per-call allocation and RNG work
    /// for large bodies. All bodies written this way share the same content
    /// after the id, so uploads go through [`Read`] instead.
    ///
    /// Returns the number of bytes written.
    pub fn write_to<W>(&mut self, wr: &mut W) -> io::Result<u64>
    where
        W: Write,
    {
        let mut written = 0;

        if self.size > 0 && self.pos < ID_LEN as u64 {
            let mut head = [0; ID_LEN];
            let n = cmp::min(ID_LEN as u64 - self.pos, self.size) as usize;
            let n = self.fill_id(&mut head[..n]);
            wr.write_all(&head[..n])?;
            self.advance(n);
            written += n as u64;
        }

        let shared = shared();
        while self.size > 0 {
            let n = cmp::min(self.size, shared.len() as u64) as usize;
            wr.write_all(&shared[..n])?;
            self.advance(n);
            written += n as u64;
        }

        Ok(written)
    }

    /// Copies the not yet produced part of the id prefix into the buffer.
    ///
    /// Returns the number of bytes copied.
    #[inline]
    fn fill_id(&self, buf: &mut [u8]) -> usize {
        if self.pos >= ID_LEN as u64 {
            return 0;
        }

        let from = self.pos as usize;
        let n = cmp::min(ID_LEN - from, buf.len());
        buf[..n].copy_from_slice(&self.id.to_le_bytes()[from..from + n]);

        n
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.pos += n as u64;
        self.size -= n as u64;
    }
}

impl<R> Read for SyntheticBody<'_, R>
where
    R: RngCore,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.size == 0 || buf.is_empty() {
            return Ok(0);
        }

        let n = cmp::min(buf.len() as u64, self.size) as usize;
        let buf = &mut buf[..n];
        let head = self.fill_id(buf);
        self.rng.fill_bytes(&mut buf[head..]);
        self.advance(n);

        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    const ID: u64 = 0x0102_0304_0506_0708;

    fn read_chunked(chunks: &[usize]) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut body = SyntheticBody::new(ID, 50, &mut rng);
        let mut out = Vec::new();

        for &chunk in chunks.iter().cycle() {
            let mut buf = vec![0; chunk];
            let n = body.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(0, body.remaining());
        out
    }

    #[test]
    fn exact_size_for_any_chunking() {
        for chunks in [&[1][..], &[3, 5], &[7], &[8], &[64], &[2, 13, 1]] {
            let out = read_chunked(chunks);

            assert_eq!(50, out.len(), "chunks: {chunks:?}");
            assert_eq!(ID.to_le_bytes(), out[..8], "chunks: {chunks:?}");
        }
    }

    #[test]
    fn eof_after_exhaustion() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut body = SyntheticBody::new(ID, 4, &mut rng);
        let mut buf = [0; 16];

        assert_eq!(4, body.read(&mut buf).unwrap());
        assert_eq!(ID.to_le_bytes()[..4], buf[..4]);
        assert_eq!(0, body.read(&mut buf).unwrap());
        assert_eq!(0, body.remaining());
    }

    #[test]
    fn write_to_larger_than_shared_buffer() {
        let mut rng = SmallRng::seed_from_u64(7);
        let size = SHARED_LEN as u64 * 2 + 17;
        let mut body = SyntheticBody::new(ID, size, &mut rng);
        let mut out = Vec::new();

        assert_eq!(size, body.write_to(&mut out).unwrap());
        assert_eq!(size as usize, out.len());
        assert_eq!(ID.to_le_bytes(), out[..8]);
        assert_eq!(0, body.remaining());
    }

    #[test]
    fn write_to_after_partial_read() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut body = SyntheticBody::new(ID, 50, &mut rng);
        let mut out = vec![0; 3];

        assert_eq!(3, body.read(&mut out).unwrap());
        assert_eq!(47, body.write_to(&mut out).unwrap());
        assert_eq!(50, out.len());
        assert_eq!(ID.to_le_bytes(), out[..8]);
    }
}
