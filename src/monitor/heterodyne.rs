use crate::capture::CaptureSession;
use crate::error::MonitorError;

use super::filter::AntiAliasFilter;
use super::oscillator::{Phase, ReferenceTable};
use super::AA_STAGES;

/// Largest boost: the shift before saturation drops to zero.
pub const MAX_BOOST_SHIFT: u32 = 15;

/// Heterodyne tones in kHz; tone 2 is off when zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tones {
    pub tone1_khz: u32,
    pub tone2_khz: u32,
}

impl Tones {
    pub fn new(tone1_khz: u32, tone2_khz: u32) -> Self {
        Self {
            tone1_khz,
            tone2_khz,
        }
    }

    pub fn validate(&self, reference_len: usize) -> Result<(), MonitorError> {
        let max = reference_len as u32;
        for tone in [self.tone1_khz, self.tone2_khz] {
            if tone > max {
                log::info!(
                    "Heterodyne reference {} kHz outside the valid range for the frame length ({})",
                    tone,
                    max
                );
                return Err(MonitorError::ToneOutOfRange { tone, max });
            }
        }
        Ok(())
    }
}

/// Mixes mono input against one or two reference tones, low-pass filters and
/// decimates to the monitor output rate.
pub struct Heterodyne {
    reference: ReferenceTable,
    phase1: Phase,
    phase2: Phase,
    filter: AntiAliasFilter<AA_STAGES>,
    decimation_factor: u32,
    decimation_counter: u32,
    output_shift: u32,
}

impl Heterodyne {
    pub fn new(
        session: &CaptureSession,
        reference: ReferenceTable,
        tones: Tones,
        boost_shift: u32,
    ) -> Result<Self, MonitorError> {
        if boost_shift > MAX_BOOST_SHIFT {
            return Err(MonitorError::InvalidBoost(boost_shift));
        }
        tones.validate(reference.len())?;
        Ok(Self {
            reference,
            phase1: Phase::new(tones.tone1_khz as usize),
            phase2: Phase::new(tones.tone2_khz as usize),
            filter: AntiAliasFilter::new(session.iir_coefficient),
            decimation_factor: session.decimation_factor.max(1),
            decimation_counter: 0,
            // 15 rather than 16 recovers the factor of 2 lost mixing two
            // half-scale signals.
            output_shift: MAX_BOOST_SHIFT - boost_shift,
        })
    }

    /// Changes tones without resetting phase or filter state.
    pub fn set_tones(&mut self, tones: Tones) -> Result<(), MonitorError> {
        tones.validate(self.reference.len())?;
        self.phase1.step = tones.tone1_khz as usize;
        self.phase2.step = tones.tone2_khz as usize;
        Ok(())
    }

    pub fn tones(&self) -> Tones {
        Tones::new(self.phase1.step as u32, self.phase2.step as u32)
    }

    pub fn reference(&self) -> &ReferenceTable {
        &self.reference
    }

    pub fn into_reference(self) -> ReferenceTable {
        self.reference
    }

    pub fn filter_state(&self) -> &[i32; AA_STAGES] {
        self.filter.state()
    }

    /// Processes one run, appending decimated samples to `out`.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        let len = self.reference.len();
        out.reserve(input.len() / self.decimation_factor as usize + 1);

        for &sample in input {
            let s = sample as i64;
            let mut mixed = s * self.reference.at(self.phase1.index) as i64;
            if self.phase2.step != 0 {
                mixed += s * self.reference.at(self.phase2.index) as i64;
            }

            let filtered = self.filter.process(mixed);

            self.decimation_counter += 1;
            if self.decimation_counter >= self.decimation_factor {
                self.decimation_counter = 0;
                let scaled = filtered >> self.output_shift;
                out.push(scaled.clamp(i16::MIN as i64, i16::MAX as i64) as i16);
            }

            self.phase1.advance(len);
            self.phase2.advance(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(rate: u32) -> CaptureSession {
        CaptureSession::new(1, rate).unwrap()
    }

    fn heterodyne(rate: u32, tones: Tones, boost: u32) -> Heterodyne {
        let s = session(rate);
        let table = ReferenceTable::new(s.samples_per_frame as usize);
        Heterodyne::new(&s, table, tones, boost).unwrap()
    }

    #[test]
    fn emits_one_sample_per_decimation_period() {
        let mut h = heterodyne(384_000, Tones::new(40, 0), 0);
        let mut out = Vec::new();
        h.process(&vec![1000i16; 3840], &mut out);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn decimation_phase_carries_across_runs() {
        let mut h = heterodyne(384_000, Tones::new(40, 0), 0);
        let mut out = Vec::new();
        for _ in 0..8 {
            h.process(&[500i16; 3], &mut out);
        }
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn silence_stays_silent() {
        let mut h = heterodyne(250_000, Tones::new(45, 50), 4);
        let mut out = Vec::new();
        h.process(&vec![0i16; 5000], &mut out);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn rejects_tones_beyond_table() {
        let s = session(96_000);
        let table = ReferenceTable::new(s.samples_per_frame as usize);
        let err = Heterodyne::new(&s, table, Tones::new(97, 0), 0).err();
        assert!(matches!(err, Some(MonitorError::ToneOutOfRange { tone: 97, max: 96 })));
    }

    #[test]
    fn rejects_excess_boost() {
        let s = session(96_000);
        let table = ReferenceTable::new(s.samples_per_frame as usize);
        assert!(matches!(
            Heterodyne::new(&s, table, Tones::new(40, 0), 16),
            Err(MonitorError::InvalidBoost(16))
        ));
    }

    #[test]
    fn full_scale_output_saturates() {
        let mut h = heterodyne(48_000, Tones::new(0, 0), MAX_BOOST_SHIFT);
        let mut out = Vec::new();
        h.process(&vec![i16::MAX; 2000], &mut out);
        assert_eq!(*out.last().unwrap(), i16::MAX);
        let mut h = heterodyne(48_000, Tones::new(0, 0), MAX_BOOST_SHIFT);
        out.clear();
        h.process(&vec![i16::MIN; 2000], &mut out);
        assert_eq!(*out.last().unwrap(), i16::MIN);
    }

    #[test]
    fn mixing_shifts_tone_into_audible_band() {
        // 45 kHz input against a 40 kHz reference leaves a 5 kHz difference
        // tone (the 85 kHz sum is filtered away).
        let rate = 384_000;
        let mut h = heterodyne(rate, Tones::new(40, 0), 1);
        let input: Vec<i16> = (0..rate as usize / 10)
            .map(|i| {
                let t = i as f64 / rate as f64;
                ((2.0 * std::f64::consts::PI * 45_000.0 * t).sin() * 16_000.0) as i16
            })
            .collect();
        let mut out = Vec::new();
        h.process(&input, &mut out);
        let settled = &out[out.len() / 2..];
        let peak = settled.iter().map(|v| (*v as i32).abs()).max().unwrap();
        assert!(peak > 500, "difference tone missing, peak {}", peak);
        let crossings = settled.windows(2).filter(|w| (w[0] < 0) != (w[1] < 0)).count();
        let seconds = settled.len() as f64 / 48_000.0;
        let freq = crossings as f64 / 2.0 / seconds;
        assert!((freq - 5_000.0).abs() < 500.0, "measured {} Hz", freq);
    }

    #[test]
    fn filter_state_bounded_across_decimation_factors() {
        for factor in 1..=20u32 {
            let rate = 384_000;
            let s = CaptureSession::with_target_rate(1, rate, rate / factor).unwrap();
            assert_eq!(s.decimation_factor, factor);
            let table = ReferenceTable::new(s.samples_per_frame as usize);
            let tone = (s.samples_per_frame / 4).max(1);
            let mut h = Heterodyne::new(&s, table, Tones::new(tone, tone / 2), 0).unwrap();
            let input: Vec<i16> = (0..10_000)
                .map(|i| if (i / 7) % 2 == 0 { i16::MAX } else { -i16::MAX })
                .collect();
            let mut out = Vec::new();
            h.process(&input, &mut out);
            assert_eq!(out.len(), 10_000 / factor as usize);
            let bound = 2 * 32_767i64 * 0x7FFE;
            assert!(h.filter_state().iter().all(|&v| (v as i64).abs() <= bound));
        }
    }

    #[test]
    fn set_tones_keeps_phase_running() {
        let mut h = heterodyne(192_000, Tones::new(40, 0), 0);
        let mut out = Vec::new();
        h.process(&[100i16; 7], &mut out);
        let index = h.phase1.index;
        h.set_tones(Tones::new(50, 30)).unwrap();
        assert_eq!(h.phase1.index, index);
        assert_eq!(h.tones(), Tones::new(50, 30));
        assert!(h.set_tones(Tones::new(500, 0)).is_err());
    }
}
