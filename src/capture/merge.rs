use std::sync::atomic::{AtomicI16, Ordering};

use crate::usb::IsoPacketDesc;

/// Mean of a stereo pair, rounded by arithmetic shift.
#[inline]
pub fn average_pair(left: i16, right: i16) -> i16 {
    ((left as i32 + right as i32) >> 1) as i16
}

/// Removes the padding short packets leave in a transfer buffer.
///
/// Each packet's data starts at its requested offset; after compaction the
/// actual bytes sit back to back from the start of the buffer. Returns the
/// number of samples kept. Destination never runs ahead of source, so a
/// forward copy handles the overlap.
pub fn compact_packets(buffer: &[AtomicI16], packets: &[IsoPacketDesc]) -> usize {
    let mut dst = 0usize;
    let mut src = 0usize;
    for (i, packet) in packets.iter().enumerate() {
        let actual = (packet.actual_length.min(packet.length) / 2) as usize;
        if i > 0 && actual > 0 && dst != src {
            for k in 0..actual {
                let v = buffer[src + k].load(Ordering::Relaxed);
                buffer[dst + k].store(v, Ordering::Relaxed);
            }
        }
        dst += actual;
        src += (packet.length / 2) as usize;
    }
    dst
}

/// Folds interleaved stereo samples into mono at the start of the buffer and
/// returns the new count.
pub fn merge_stereo_in_place(buffer: &[AtomicI16], samples: usize) -> usize {
    let pairs = samples / 2;
    for i in 0..pairs {
        let left = buffer[2 * i].load(Ordering::Relaxed);
        let right = buffer[2 * i + 1].load(Ordering::Relaxed);
        buffer[i].store(average_pair(left, right), Ordering::Relaxed);
    }
    pairs
}

/// Downmix of an owned interleaved block, for decoded recordings.
pub fn merge_interleaved(samples: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        0 | 1 => samples.to_vec(),
        2 => samples
            .chunks_exact(2)
            .map(|pair| average_pair(pair[0], pair[1]))
            .collect(),
        n => samples
            .chunks_exact(n)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / n as i32) as i16)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atomic(values: &[i16]) -> Vec<AtomicI16> {
        values.iter().map(|&v| AtomicI16::new(v)).collect()
    }

    fn plain(buffer: &[AtomicI16], len: usize) -> Vec<i16> {
        buffer[..len].iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    fn packet(length: u32, actual_length: u32) -> IsoPacketDesc {
        IsoPacketDesc {
            length,
            actual_length,
            status: 0,
        }
    }

    #[test]
    fn full_packets_are_left_in_place() {
        let buffer = atomic(&[1, 2, 3, 4, 5, 6]);
        let n = compact_packets(&buffer, &[packet(4, 4), packet(4, 4), packet(4, 4)]);
        assert_eq!(n, 6);
        assert_eq!(plain(&buffer, n), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn short_packets_are_closed_up() {
        // Three packets of 3 requested samples; the first two came back short.
        let buffer = atomic(&[1, 2, 0, 4, 0, 0, 7, 8, 9]);
        let n = compact_packets(&buffer, &[packet(6, 4), packet(6, 2), packet(6, 6)]);
        assert_eq!(n, 6);
        assert_eq!(plain(&buffer, n), vec![1, 2, 4, 7, 8, 9]);
    }

    #[test]
    fn empty_packets_yield_nothing() {
        let buffer = atomic(&[9, 9, 9, 9]);
        assert_eq!(compact_packets(&buffer, &[packet(4, 0), packet(4, 0)]), 0);
    }

    #[test]
    fn oversized_actual_length_is_clamped() {
        let buffer = atomic(&[1, 2, 3, 4]);
        let n = compact_packets(&buffer, &[packet(4, 6), packet(4, 4)]);
        assert_eq!(n, 4);
    }

    #[test]
    fn stereo_merge_halves_count() {
        let buffer = atomic(&[100, 300, -4, 2, 7, 8]);
        let n = merge_stereo_in_place(&buffer, 6);
        assert_eq!(n, 3);
        assert_eq!(plain(&buffer, n), vec![200, -1, 7]);
    }

    #[test]
    fn stereo_merge_ignores_trailing_odd_sample() {
        let buffer = atomic(&[10, 20, 30]);
        assert_eq!(merge_stereo_in_place(&buffer, 3), 1);
        assert_eq!(buffer[0].load(Ordering::Relaxed), 15);
    }

    #[test]
    fn average_pair_does_not_overflow() {
        assert_eq!(average_pair(i16::MAX, i16::MAX), i16::MAX);
        assert_eq!(average_pair(i16::MIN, i16::MIN), i16::MIN);
        assert_eq!(average_pair(100, 300), 200);
    }

    #[test]
    fn interleaved_downmix() {
        assert_eq!(merge_interleaved(&[100, 300, 1, 3], 2), vec![200, 2]);
        assert_eq!(merge_interleaved(&[5, 6], 1), vec![5, 6]);
    }
}
