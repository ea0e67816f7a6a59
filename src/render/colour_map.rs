use crate::error::RenderError;

use super::surface::{rgb565, PixelSurface};

/// RGB565 lookup from brightness/contrast-adjusted dB to colour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColourMap {
    colours: Vec<u16>,
    graph_colour: u16,
}

impl ColourMap {
    /// Copies `table`; later changes to the caller's table are not seen.
    pub fn load(table: &[u16]) -> Result<Self, RenderError> {
        if table.is_empty() {
            return Err(RenderError::EmptyColourMap);
        }
        log::debug!("Colour map loaded: {} entries", table.len());
        Ok(Self {
            colours: table.to_vec(),
            graph_colour: rgb565(0, 255, 0),
        })
    }

    /// Black to white ramp.
    pub fn grayscale(levels: usize) -> Self {
        let levels = levels.max(2);
        let colours = (0..levels)
            .map(|i| {
                let v = (i * 255 / (levels - 1)) as u8;
                rgb565(v, v, v)
            })
            .collect();
        Self {
            colours,
            graph_colour: rgb565(0, 255, 0),
        }
    }

    /// Black, blue, magenta, orange, yellow, white.
    pub fn heat(levels: usize) -> Self {
        const STOPS: [(f32, f32, f32); 6] = [
            (0.0, 0.0, 0.0),
            (0.0, 0.0, 160.0),
            (180.0, 0.0, 180.0),
            (255.0, 120.0, 0.0),
            (255.0, 230.0, 0.0),
            (255.0, 255.0, 255.0),
        ];
        let levels = levels.max(2);
        let colours = (0..levels)
            .map(|i| {
                let t = i as f32 / (levels - 1) as f32 * (STOPS.len() - 1) as f32;
                let k = (t as usize).min(STOPS.len() - 2);
                let f = t - k as f32;
                let (a, b) = (STOPS[k], STOPS[k + 1]);
                let lerp = |x: f32, y: f32| (x + (y - x) * f).round().clamp(0.0, 255.0) as u8;
                rgb565(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
            })
            .collect();
        Self {
            colours,
            graph_colour: rgb565(0, 255, 0),
        }
    }

    pub fn with_graph_colour(mut self, colour: u16) -> Self {
        self.graph_colour = colour;
        self
    }

    /// Colour for the amplitude strip.
    pub fn graph_colour(&self) -> u16 {
        self.graph_colour
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    pub fn colours(&self) -> &[u16] {
        &self.colours
    }

    /// `(value - offset) * multiplier`, truncated towards zero and clamped to
    /// the table.
    #[inline]
    pub fn index_for(&self, value: f32, offset: f32, multiplier: f32) -> usize {
        let scaled = ((value - offset) * multiplier) as i64;
        scaled.clamp(0, self.colours.len() as i64 - 1) as usize
    }

    #[inline]
    pub fn colour_for(&self, value: f32, offset: f32, multiplier: f32) -> u16 {
        self.colours[self.index_for(value, offset, multiplier)]
    }
}

/// Brightness and contrast for [`render_colour_map`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub offset: f32,
    pub multiplier: f32,
}

impl Calibration {
    /// Spreads `[min_db, max_db]` across every colour in a table of `levels`.
    pub fn from_range(min_db: f32, max_db: f32, levels: usize) -> Self {
        let span = (max_db - min_db).max(f32::EPSILON);
        Self {
            offset: min_db,
            multiplier: levels.saturating_sub(1) as f32 / span,
        }
    }
}

/// Paints time buckets `first..second` of a dB matrix (`buckets` values per
/// time bucket) onto `surface`, one pixel per cell. The frequency axis is
/// flipped so the highest bucket lands on row 0.
pub fn render_colour_map(
    map: &ColourMap,
    db: &[f32],
    buckets: usize,
    first: usize,
    second: usize,
    surface: &mut PixelSurface,
    calibration: Calibration,
) -> Result<usize, RenderError> {
    if second <= first {
        return Ok(0);
    }
    let required = second * buckets;
    if db.len() < required {
        return Err(RenderError::InputTooSmall {
            what: "dB matrix",
            required,
            actual: db.len(),
        });
    }
    if surface.width() < second || surface.height() < buckets {
        return Err(RenderError::SurfaceTooSmall {
            width: surface.width(),
            height: surface.height(),
            what: format!("{} time x {} frequency buckets", second, buckets),
        });
    }

    let Calibration { offset, multiplier } = calibration;
    for time in first..second {
        let row = &db[time * buckets..(time + 1) * buckets];
        for (frequency, &value) in row.iter().enumerate() {
            let index = surface.offset_from_bottom(time, frequency, buckets);
            surface.pixels_mut()[index] = map.colour_for(value, offset, multiplier);
        }
    }
    Ok(second - first)
}

/// Smallest and largest dB in the inclusive region `x_min..=x_max` (time) by
/// `y_min..=y_max` (frequency, in display orientation with row 0 at the top).
///
/// `None` for a zero-width or zero-height region and for regions outside the
/// matrix.
pub fn query_db_range(
    db: &[f32],
    buckets: usize,
    x_min: usize,
    x_max: usize,
    y_min: usize,
    y_max: usize,
) -> Option<(f32, f32)> {
    if x_min == x_max || y_min == y_max {
        return None;
    }
    if x_min > x_max || y_min > y_max || y_max >= buckets {
        return None;
    }
    let end = x_max.checked_add(1)?.checked_mul(buckets)?;
    if end > db.len() {
        return None;
    }

    let y1 = buckets - y_max - 1;
    let y2 = buckets - y_min - 1;
    let mut range: Option<(f32, f32)> = None;
    for time in x_min..=x_max {
        let row = &db[time * buckets..(time + 1) * buckets];
        for &value in &row[y1..=y2] {
            range = Some(match range {
                None => (value, value),
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
            });
        }
    }
    range
}
