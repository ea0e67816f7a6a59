use crate::guard::GuardedBuffer;

pub const MAX_REFERENCE_LEN: usize = 512;
pub const REFERENCE_AMPLITUDE: f64 = 0x7FFE as f64;
const GUARD: i16 = 0xFACEu16 as i16;

/// One cycle of a cosine with as many points as samples in a 1 ms frame, so
/// stepping through it `k` entries per sample produces a `k` kHz tone.
#[derive(Clone, Debug)]
pub struct ReferenceTable {
    data: GuardedBuffer<i16>,
}

impl ReferenceTable {
    pub fn new(samples_per_frame: usize) -> Self {
        let n = samples_per_frame.clamp(1, MAX_REFERENCE_LEN);
        let mut data = GuardedBuffer::new(n, 0i16, GUARD);
        let pi2 = std::f64::consts::PI * 2.0;
        for (i, v) in data.as_mut_slice().iter_mut().enumerate() {
            let x = i as f64 * pi2 / n as f64;
            *v = (x.cos() * REFERENCE_AMPLITUDE) as i16;
        }
        data.debug_check();
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn at(&self, index: usize) -> i16 {
        self.data.as_slice()[index]
    }

    pub fn values(&self) -> &[i16] {
        self.data.as_slice()
    }

    pub fn is_intact(&self) -> bool {
        self.data.is_intact()
    }
}

/// Phase index stepping through a shared reference table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Phase {
    pub index: usize,
    pub step: usize,
}

impl Phase {
    pub fn new(step: usize) -> Self {
        Self { index: 0, step }
    }

    #[inline]
    pub fn advance(&mut self, len: usize) {
        self.index = (self.index + self.step) % len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_entry_per_sample_in_a_millisecond() {
        let table = ReferenceTable::new(384);
        assert_eq!(table.len(), 384);
        assert!(table.is_intact());
    }

    #[test]
    fn table_is_a_full_scale_cosine() {
        let n = 250;
        let table = ReferenceTable::new(n);
        for i in 0..n {
            let expected = (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos() * REFERENCE_AMPLITUDE;
            assert!((table.at(i) as f64 - expected).abs() <= 1.0, "entry {}", i);
        }
        assert_eq!(table.at(0), 0x7FFE);
        assert_eq!(table.at(n / 2), -0x7FFE);
    }

    #[test]
    fn table_length_is_capped() {
        let table = ReferenceTable::new(4096);
        assert_eq!(table.len(), MAX_REFERENCE_LEN);
        assert!(table.is_intact());
    }

    #[test]
    fn phase_wraps_modulo_length() {
        let mut phase = Phase::new(30);
        for _ in 0..4 {
            phase.advance(100);
        }
        assert_eq!(phase.index, 20);
    }
}
