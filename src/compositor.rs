// Arranges the watermark and the session photos on the print canvas

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

use crate::capture::CapturedFrame;
use crate::config::Config;
use crate::errors::{AppResult, ComposeError};
use crate::sheet::{Margins, SheetGeometry};

/// Grid parameters, all in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub canvas: (u32, u32),
    pub margins: Margins,
    pub spacing: f64,
    pub per_row: u32,
}

impl From<&SheetGeometry> for Grid {
    fn from(geometry: &SheetGeometry) -> Self {
        Self {
            canvas: geometry.canvas,
            margins: geometry.margins,
            spacing: geometry.spacing,
            per_row: geometry.per_row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Index ranges of the images placed on each row. Rows are filled by a
/// ceiling split, so 3 images at 2 per row land as `[0, 1]` then `[2]`.
pub fn row_ranges(total: usize, per_row: u32) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let per_row = per_row.max(1) as usize;
    let rows = div_ceil(total, per_row);

    (0..rows)
        .map(|i| div_ceil(i * total, rows)..div_ceil((i + 1) * total, rows))
        .collect()
}

/// Size of one cell. Width splits the printable width by `per_row`; height
/// splits the printable height the same way, or by the row count when more
/// rows than `per_row` are needed.
pub fn cell_size(grid: &Grid, total: usize) -> Result<(u32, u32), ComposeError> {
    let per_row = grid.per_row.max(1) as usize;
    let rows = div_ceil(total.max(1), per_row);
    let bands = rows.max(per_row);

    let (canvas_w, canvas_h) = grid.canvas;
    let m = &grid.margins;
    let w = (canvas_w as f64 - m.left - m.right - grid.spacing * (per_row as f64 - 1.0))
        / per_row as f64;
    let h = (canvas_h as f64 - m.top - m.bottom - grid.spacing * (bands as f64 - 1.0))
        / bands as f64;

    if w < 1.0 || h < 1.0 {
        return Err(ComposeError::InvalidDimensions(format!(
            "cells of {:.1}x{:.1}px do not fit a {}x{} canvas",
            w, h, canvas_w, canvas_h
        )));
    }
    Ok((w.floor() as u32, h.floor() as u32))
}

/// Where every image goes, left to right and top to bottom.
pub fn plan_layout(grid: &Grid, total: usize) -> Result<Vec<Placement>, ComposeError> {
    if total == 0 {
        return Err(ComposeError::NoImages);
    }
    let (w, h) = cell_size(grid, total)?;
    let mut placements = Vec::with_capacity(total);

    let mut y = grid.margins.top;
    for range in row_ranges(total, grid.per_row) {
        let mut x = grid.margins.left;
        for index in range {
            placements.push(Placement {
                index,
                x: x as i64,
                y: y as i64,
                width: w,
                height: h,
            });
            x += w as f64 + grid.spacing;
        }
        y += h as f64 + grid.spacing;
    }

    Ok(placements)
}

/// Paint `images` onto a fresh canvas. Each image is stretched to the cell
/// size, aspect ratio is not kept. Same inputs, same output.
pub fn compose(
    grid: &Grid,
    images: &[RgbImage],
    background: Rgb<u8>,
) -> Result<RgbImage, ComposeError> {
    if let Some(empty) = images.iter().position(|i| i.width() == 0 || i.height() == 0) {
        return Err(ComposeError::InvalidDimensions(format!(
            "image {} has no pixels",
            empty
        )));
    }

    let placements = plan_layout(grid, images.len())?;
    let (canvas_w, canvas_h) = grid.canvas;
    let mut canvas = ImageBuffer::from_pixel(canvas_w, canvas_h, background);

    for placement in placements {
        let resized = imageops::resize(
            &images[placement.index],
            placement.width,
            placement.height,
            FilterType::Lanczos3,
        );
        imageops::replace(&mut canvas, &resized, placement.x, placement.y);
    }

    Ok(canvas)
}

/// The session's compositor: fixed grid, background color and watermark.
pub struct LayoutCompositor {
    grid: Grid,
    background: Rgb<u8>,
    watermark: RgbImage,
}

impl LayoutCompositor {
    pub fn new(grid: Grid, background: Rgb<u8>, watermark: RgbImage) -> Self {
        Self {
            grid,
            background,
            watermark,
        }
    }

    /// Resolves the sheet format and loads the watermark. Both failures are
    /// configuration problems and end startup.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let geometry = SheetGeometry::from_config(&config.printer)?;
        debug!(
            format = %geometry.format,
            width = geometry.canvas.0,
            height = geometry.canvas.1,
            "Print canvas"
        );
        let watermark = load_watermark(&config.paths.watermark)?;
        Ok(Self::new(
            Grid::from(&geometry),
            Rgb(config.printer.canvas_color),
            watermark,
        ))
    }

    pub fn compose_frames(&self, frames: Vec<CapturedFrame>) -> Result<RgbImage, ComposeError> {
        let mut images = Vec::with_capacity(frames.len() + 1);
        images.push(self.watermark.clone());
        images.extend(frames.into_iter().map(|f| f.image));
        compose(&self.grid, &images, self.background)
    }
}

fn load_watermark(path: &Path) -> Result<RgbImage, ComposeError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| ComposeError::WatermarkLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(per_row: u32) -> Grid {
        Grid {
            canvas: (1000, 700),
            margins: Margins {
                top: 20.0,
                right: 30.0,
                bottom: 40.0,
                left: 50.0,
            },
            spacing: 10.0,
            per_row,
        }
    }

    fn solid(color: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(40, 30, Rgb(color))
    }

    fn close(a: &Rgb<u8>, b: [u8; 3]) -> bool {
        a.0.iter().zip(b.iter()).all(|(x, y)| (*x as i16 - *y as i16).abs() <= 2)
    }

    #[test]
    fn test_three_at_two_per_row() {
        assert_eq!(row_ranges(3, 2), vec![0..2, 2..3]);
    }

    #[test]
    fn test_per_row_clamped_to_one() {
        assert_eq!(row_ranges(2, 0), vec![0..1, 1..2]);
        let placements = plan_layout(&grid(0), 2).unwrap();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].x, placements[1].x);
    }

    #[test]
    fn test_cell_size_formula() {
        // (1000 - 50 - 30 - 10) / 2 = 455, (700 - 20 - 40 - 10) / 2 = 315
        assert_eq!(cell_size(&grid(2), 4).unwrap(), (455, 315));
    }

    #[test]
    fn test_every_image_placed_inside_margins() {
        for per_row in 1..=5u32 {
            for n in 1..=14usize {
                let g = grid(per_row);
                let placements = plan_layout(&g, n).unwrap();
                assert_eq!(placements.len(), n, "n={} per_row={}", n, per_row);

                let (w, h) = cell_size(&g, n).unwrap();
                let mut seen: Vec<usize> = placements.iter().map(|p| p.index).collect();
                seen.sort_unstable();
                assert_eq!(seen, (0..n).collect::<Vec<_>>());

                for p in &placements {
                    assert_eq!((p.width, p.height), (w, h));
                    assert!(p.x as f64 >= g.margins.left);
                    assert!(p.y as f64 >= g.margins.top);
                    assert!((p.x + w as i64) as f64 <= 1000.0 - g.margins.right);
                    assert!((p.y + h as i64) as f64 <= 700.0 - g.margins.bottom);
                }
            }
        }
    }

    #[test]
    fn test_rows_advance_left_to_right_top_to_bottom() {
        let placements = plan_layout(&grid(2), 3).unwrap();
        assert_eq!((placements[0].x, placements[0].y), (50, 20));
        assert_eq!((placements[1].x, placements[1].y), (50 + 455 + 10, 20));
        assert_eq!((placements[2].x, placements[2].y), (50, 20 + 315 + 10));
    }

    #[test]
    fn test_no_images() {
        assert!(matches!(plan_layout(&grid(2), 0), Err(ComposeError::NoImages)));
        assert!(matches!(
            compose(&grid(2), &[], Rgb([255, 255, 255])),
            Err(ComposeError::NoImages)
        ));
    }

    #[test]
    fn test_canvas_too_small() {
        let mut g = grid(2);
        g.canvas = (60, 60);
        assert!(matches!(
            cell_size(&g, 2),
            Err(ComposeError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_compose_paints_cells_and_background() {
        let images = [solid([255, 0, 0]), solid([0, 255, 0]), solid([0, 0, 255])];
        let canvas = compose(&grid(2), &images, Rgb([255, 255, 255])).unwrap();

        assert_eq!(canvas.dimensions(), (1000, 700));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert!(close(canvas.get_pixel(50 + 200, 20 + 150), [255, 0, 0]));
        assert!(close(canvas.get_pixel(515 + 200, 20 + 150), [0, 255, 0]));
        assert!(close(canvas.get_pixel(50 + 200, 345 + 150), [0, 0, 255]));
        // the empty fourth cell keeps the background
        assert_eq!(canvas.get_pixel(515 + 200, 345 + 150), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let images = [solid([10, 20, 30]), solid([200, 100, 50])];
        let a = compose(&grid(2), &images, Rgb([0, 0, 0])).unwrap();
        let b = compose(&grid(2), &images, Rgb([0, 0, 0])).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_compositor_puts_watermark_first() {
        let compositor = LayoutCompositor::new(grid(2), Rgb([255, 255, 255]), solid([9, 9, 9]));
        let frames = vec![
            CapturedFrame::new(1, solid([200, 0, 0])),
            CapturedFrame::new(2, solid([0, 200, 0])),
            CapturedFrame::new(3, solid([0, 0, 200])),
        ];
        let canvas = compositor.compose_frames(frames).unwrap();
        assert!(close(canvas.get_pixel(60, 30), [9, 9, 9]));
        assert!(close(canvas.get_pixel(600, 30), [200, 0, 0]));
        assert!(close(canvas.get_pixel(600, 400), [0, 0, 200]));
    }

    #[test]
    fn test_missing_watermark() {
        let err = load_watermark(Path::new("/nonexistent/template.png")).unwrap_err();
        assert!(matches!(err, ComposeError::WatermarkLoad { .. }));
    }
}
