use crate::error::RenderError;

use super::surface::{PixelSurface, BLACK};

/// Value range mapped onto the full surface height.
pub const AMPLITUDE_MIN: f32 = -0x7FFF as f32;
pub const AMPLITUDE_MAX: f32 = 0x7FFF as f32;

/// Draws one column per window: the span between the window's smallest and
/// largest sample in `colour`, black above and below. Columns start at
/// `first_column`; any past the surface's right edge are dropped. Returns the
/// number of windows read.
pub fn render_amplitude(
    slices: &[f32],
    window_count: usize,
    window_size: usize,
    surface: &mut PixelSurface,
    first_column: usize,
    colour: u16,
) -> Result<usize, RenderError> {
    let required = window_count * window_size;
    if slices.len() < required {
        return Err(RenderError::InputTooSmall {
            what: "slice buffer",
            required,
            actual: slices.len(),
        });
    }
    if window_size == 0 {
        return Ok(0);
    }

    let height = surface.height();
    let scaling = height as f32 / (AMPLITUDE_MAX - AMPLITUDE_MIN);

    for (i, window) in slices[..required].chunks_exact(window_size).enumerate() {
        let (min, max) = window
            .iter()
            .fold((window[0], window[0]), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let y_min = ((min - AMPLITUDE_MIN) * scaling) as i64;
        let y_max = ((max - AMPLITUDE_MIN) * scaling) as i64;

        let x = first_column + i;
        for row in 0..height {
            // Height above the bottom edge, 1 for the lowest row.
            let y = (height - row) as i64;
            let c = if y >= y_min && y <= y_max { colour } else { BLACK };
            surface.set(x, row, c);
        }
    }

    Ok(window_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(surface: &PixelSurface, x: usize) -> Vec<u16> {
        (0..surface.height()).map(|row| surface.get(x, row)).collect()
    }

    #[test]
    fn full_scale_window_fills_column() {
        let mut s = PixelSurface::new(1, 8);
        let slices = [AMPLITUDE_MIN, AMPLITUDE_MAX];
        render_amplitude(&slices, 1, 2, &mut s, 0, 0xFFFF).unwrap();
        // y_min is 0, below the lowest row. The top row depends on rounding
        // of the scaled maximum.
        assert!(column(&s, 0)[1..].iter().all(|&p| p == 0xFFFF));
    }

    #[test]
    fn quiet_window_paints_middle_rows_only() {
        let mut s = PixelSurface::new(1, 10);
        s.fill(0x1234);
        let slices = [-100.0, 100.0, 0.0, 50.0];
        render_amplitude(&slices, 1, 4, &mut s, 0, 0xFFFF).unwrap();
        let col = column(&s, 0);
        // -100 scales to y = 4 (row 6), +100 to y = 5 (row 5).
        let lit: Vec<usize> = (0..10).filter(|&r| col[r] == 0xFFFF).collect();
        assert_eq!(lit, vec![5, 6]);
        assert!(col.iter().all(|&p| p == 0xFFFF || p == BLACK));
    }

    #[test]
    fn one_column_per_window_from_offset() {
        let mut s = PixelSurface::new(4, 4);
        let slices = [0.0f32; 6];
        assert_eq!(render_amplitude(&slices, 3, 2, &mut s, 2, 7).unwrap(), 3);
        assert!(column(&s, 0).iter().all(|&p| p == BLACK));
        assert!(column(&s, 2).contains(&7));
        assert!(column(&s, 3).contains(&7));
    }

    #[test]
    fn short_slice_buffer_is_rejected() {
        let mut s = PixelSurface::new(4, 4);
        assert!(render_amplitude(&[0.0; 3], 2, 2, &mut s, 0, 7).is_err());
    }
}
