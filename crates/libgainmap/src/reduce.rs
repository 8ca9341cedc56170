//! Area reductions over float images.

use rayon::prelude::*;

use crate::pixel::{FloatImageContent, FloatPixel};

/// Window edge used when measuring headroom.
pub const DEFAULT_WINDOW: usize = 64;

/// Per-window channel-wise minimum and maximum.
///
/// Cell `(i, j)` covers pixels `[i * window, (i + 1) * window)` horizontally and the
/// same range vertically; windows on the right and bottom edges may be partial.
#[derive(Debug, Clone)]
pub struct MinMaxGrid {
    pub window: usize,
    pub minimum: FloatImageContent,
    pub maximum: FloatImageContent,
}

pub fn area_min_max(content: &FloatImageContent, window: usize) -> MinMaxGrid {
    let window = window.max(1);
    let (width, height) = content.extent();
    let columns = width.div_ceil(window);
    let rows = height.div_ceil(window);

    let cells: Vec<(FloatPixel, FloatPixel)> = (0..columns * rows)
        .into_par_iter()
        .map(|cell| {
            let (cx, cy) = (cell % columns, cell / columns);
            let mut lo = FloatPixel::splat(f32::INFINITY);
            let mut hi = FloatPixel::splat(f32::NEG_INFINITY);
            for y in cy * window..((cy + 1) * window).min(height) {
                for x in cx * window..((cx + 1) * window).min(width) {
                    let p = content.get_at(x, y);
                    lo = lo.min(&p);
                    hi = hi.max(&p);
                }
            }
            (lo, hi)
        })
        .collect();

    let (mins, maxs): (Vec<_>, Vec<_>) = cells.into_iter().unzip();
    MinMaxGrid {
        window,
        minimum: FloatImageContent::from_pixels(columns, rows, mins).unwrap_or_else(|| FloatImageContent::with_extent(0, 0)),
        maximum: FloatImageContent::from_pixels(columns, rows, maxs).unwrap_or_else(|| FloatImageContent::with_extent(0, 0)),
    }
}

/// Channel-wise maximum over the whole image. An empty image yields zero.
pub fn area_maximum(content: &FloatImageContent) -> FloatPixel {
    content.pixels()
        .par_iter()
        .copied()
        .reduce_with(|a, b| a.max(&b))
        .unwrap_or(FloatPixel::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_partial_edge_windows() {
        let content = FloatImageContent::from_fn(5, 3, |x, y| FloatPixel::new(x as f32, y as f32, (x * y) as f32));
        let grid = area_min_max(&content, 2);
        assert_eq!(grid.maximum.extent(), (3, 2));
        assert_eq!(grid.maximum.get_at(2, 1).rgb(), [4.0, 2.0, 8.0]);
        assert_eq!(grid.minimum.get_at(1, 0).rgb(), [2.0, 0.0, 0.0]);
    }

    #[test]
    fn maximum_of_window_maxima_is_global_maximum() {
        let content = FloatImageContent::from_fn(130, 70, |x, y| {
            if (x, y) == (97, 66) { FloatPixel::new(3.0, 7.5, 1.0) } else { FloatPixel::splat(0.25) }
        });
        let grid = area_min_max(&content, DEFAULT_WINDOW);
        assert_eq!(area_maximum(&grid.maximum).rgb(), [3.0, 7.5, 1.0]);
        assert_eq!(area_maximum(&content), area_maximum(&grid.maximum));
    }

    #[test]
    fn empty_image_reduces_to_zero() {
        let content = FloatImageContent::with_extent(0, 0);
        assert_eq!(area_maximum(&content), FloatPixel::zero());
        assert!(area_min_max(&content, 8).maximum.is_empty());
    }
}
