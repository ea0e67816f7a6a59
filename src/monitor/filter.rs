/// Q31 fixed-point one-pole low-pass, cascaded `AA_STAGES` times.
#[derive(Clone, Debug)]
pub struct AntiAliasFilter<const STAGES: usize> {
    coefficient: i64,
    previous: [i32; STAGES],
}

const ONE_Q31: i64 = 1i64 << 31;

impl<const STAGES: usize> AntiAliasFilter<STAGES> {
    pub fn new(coefficient: i32) -> Self {
        Self {
            coefficient: coefficient as i64,
            previous: [0; STAGES],
        }
    }

    pub fn reset(&mut self) {
        self.previous = [0; STAGES];
    }

    pub fn state(&self) -> &[i32; STAGES] {
        &self.previous
    }

    /// Runs one sample through every stage.
    ///
    /// Each stage is a convex blend of its input and previous output, so the
    /// result stays inside the range of the inputs seen so far and fits i32
    /// for any input that does.
    #[inline]
    pub fn process(&mut self, input: i64) -> i64 {
        let mut filtered = input;
        for prev in self.previous.iter_mut() {
            filtered = (self.coefficient * filtered + (ONE_Q31 - self.coefficient) * *prev as i64) >> 31;
            *prev = filtered as i32;
        }
        filtered
    }
}
