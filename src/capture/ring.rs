use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::usb::SlotBuffer;

/// Notification for one drained transfer: `len` mono samples at the start of
/// a slot buffer.
///
/// The run keeps the slot storage alive, so exporting stays memory safe after
/// capture stops. The slot is resubmitted as soon as the run is sent, so a
/// slow reader may see samples from a later transfer. No lock is taken on
/// either side; the capture thread never waits for an export.
#[derive(Clone)]
pub struct SampleRun {
    buffer: Arc<SlotBuffer>,
    len: usize,
    sequence: u64,
}

impl SampleRun {
    pub(crate) fn new(buffer: Arc<SlotBuffer>, len: usize, sequence: u64) -> Self {
        debug_assert!(len <= buffer.capacity());
        Self {
            buffer,
            len,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of this run in the capture, counting from zero.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn iter(&self) -> impl Iterator<Item = i16> + '_ {
        self.buffer.samples()[..self.len]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
    }

    pub fn to_vec(&self) -> Vec<i16> {
        self.iter().collect()
    }

    /// Copies up to `count` samples into `ring` at `offset`, wrapping at the
    /// ring's end. See [`copy_wrapped`].
    pub fn copy_into_ring(&self, count: usize, ring: &mut [i16], offset: usize) -> usize {
        copy_wrapped(self.iter(), count.min(self.len), ring, offset)
    }
}

impl std::fmt::Debug for SampleRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRun")
            .field("len", &self.len)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Copies `count` samples from `source` into a circular buffer starting at
/// `offset` and returns how many were written.
///
/// Short copies: the count is capped at the ring capacity (a larger request
/// would only overwrite its own head) and at what `source` yields. An offset
/// past the end is taken modulo the capacity.
pub fn copy_wrapped<I>(source: I, count: usize, ring: &mut [i16], offset: usize) -> usize
where
    I: IntoIterator<Item = i16>,
{
    let capacity = ring.len();
    if capacity == 0 {
        return 0;
    }
    let wanted = count.min(capacity);
    let start = offset % capacity;

    let mut copied = 0;
    for (i, sample) in source.into_iter().take(wanted).enumerate() {
        let mut at = start + i;
        if at >= capacity {
            at -= capacity;
        }
        ring[at] = sample;
        copied += 1;
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_without_wrap() {
        let mut ring = [0i16; 8];
        let n = copy_wrapped([1, 2, 3], 3, &mut ring, 2);
        assert_eq!(n, 3);
        assert_eq!(ring, [0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn wraps_three_from_the_end() {
        let cap = 8;
        let mut ring = [0i16; 8];
        let source: Vec<i16> = (1..=5).collect();
        let n = copy_wrapped(source, 5, &mut ring, cap - 3);
        assert_eq!(n, 5);
        assert_eq!(&ring[cap - 3..], &[1, 2, 3]);
        assert_eq!(&ring[..2], &[4, 5]);
        assert_eq!(&ring[2..cap - 3], &[0, 0, 0]);
    }

    #[test]
    fn truncates_to_capacity() {
        let mut ring = [0i16; 4];
        let source: Vec<i16> = (1..=10).collect();
        let n = copy_wrapped(source, 10, &mut ring, 1);
        assert_eq!(n, 4);
        assert_eq!(ring, [4, 1, 2, 3]);
    }

    #[test]
    fn short_source_limits_count() {
        let mut ring = [0i16; 4];
        assert_eq!(copy_wrapped([7, 8], 4, &mut ring, 0), 2);
        assert_eq!(ring, [7, 8, 0, 0]);
    }

    #[test]
    fn empty_ring_copies_nothing() {
        let mut ring: [i16; 0] = [];
        assert_eq!(copy_wrapped([1, 2], 2, &mut ring, 0), 0);
    }

    #[test]
    fn run_exports_after_pool_is_gone() {
        let buffer = Arc::new(SlotBuffer::new(16));
        for i in 0..4 {
            buffer.store(i, (i as i16 + 1) * 10);
        }
        let run = SampleRun::new(Arc::clone(&buffer), 4, 0);
        drop(buffer);

        let mut ring = [0i16; 6];
        assert_eq!(run.copy_into_ring(4, &mut ring, 4), 4);
        assert_eq!(ring, [30, 40, 0, 0, 10, 20]);
        assert_eq!(run.copy_into_ring(100, &mut ring, 0), 4);
    }

    #[test]
    fn concurrent_overwrite_reads_are_tolerated() {
        // The capture thread may rewrite a slot while the host copies it. The
        // host only ever sees values the writer stored, never garbage.
        let buffer = Arc::new(SlotBuffer::new(256));
        let run = SampleRun::new(Arc::clone(&buffer), 256, 0);
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for round in 0..200i16 {
                    for i in 0..256 {
                        buffer.store(i, round);
                    }
                }
            })
        };
        let mut ring = vec![0i16; 256];
        for _ in 0..200 {
            assert_eq!(run.copy_into_ring(256, &mut ring, 0), 256);
            assert!(ring.iter().all(|&v| (0..200).contains(&v)));
        }
        writer.join().unwrap();
        assert!(buffer.is_intact());
    }
}
