//! Output naming for sweep cells.
//!
//! Generates deterministic filenames for downloaded cell results so a grid
//! sorts correctly in a file browser.

/// Number of decimal digits needed to print `count - 1` (at least 1).
fn index_width(count: usize) -> usize {
    count.saturating_sub(1).max(1).to_string().len()
}

/// Generate a cell result filename.
///
/// Convention: `{prefix}_x{xx}_y{yy}.{ext}` where indices are zero-padded to
/// the width of the largest index on their axis.
///
/// # Examples
///
/// ```
/// use xyplot_core::naming::cell_filename;
///
/// assert_eq!(cell_filename("sweep", 0, 2, 3, 3, "png"), "sweep_x0_y2.png");
/// assert_eq!(cell_filename("sweep", 3, 0, 12, 1, "png"), "sweep_x03_y0.png");
/// ```
pub fn cell_filename(
    prefix: &str,
    x_index: usize,
    y_index: usize,
    x_count: usize,
    y_count: usize,
    ext: &str,
) -> String {
    let x_width = index_width(x_count);
    let y_width = index_width(y_count);
    let ext = ext.trim_start_matches('.');
    format!("{prefix}_x{x_index:0>x_width$}_y{y_index:0>y_width$}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_digit_axes() {
        assert_eq!(cell_filename("b", 1, 2, 2, 3, "png"), "b_x1_y2.png");
    }

    #[test]
    fn pads_to_widest_index() {
        assert_eq!(cell_filename("b", 5, 7, 11, 100, "webp"), "b_x05_y07.webp");
        assert_eq!(cell_filename("b", 10, 99, 11, 100, "webp"), "b_x10_y99.webp");
    }

    #[test]
    fn strips_leading_dot_from_extension() {
        assert_eq!(cell_filename("b", 0, 0, 1, 1, ".jpg"), "b_x0_y0.jpg");
    }
}
