// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Heatmap rendering
//!
//! Each column's quantile samples are spread over the canvas height, row 0
//! holding the lowest quantile. A sample is coloured by where it falls in a
//! reference distribution, so the same value gets the same colour in every
//! column.
//!
//! ```text
//!   data[0..=n]          rows
//!   q=0.0  ── cdf ──►  palette[c]  y = 0
//!   ...                            ...
//!   q=1.0  ── cdf ──►  palette[c]  y = height-1
//! ```

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use rothko_core::{RothkoError, RothkoResult};

use crate::colors::Color;
use crate::merger::Column;

/// An RGBA pixel buffer, four bytes per pixel, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: usize,
    height: usize,
    pix: Vec<u8>,
}

impl Canvas {
    /// A transparent canvas.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pix: vec![0; 4 * width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pix
    }

    /// Opaque colour at `(x, y)`, or `None` outside the canvas.
    pub fn get(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = 4 * (y * self.width + x);
        Some([self.pix[i], self.pix[i + 1], self.pix[i + 2], self.pix[i + 3]])
    }

    /// Fill `[x0, x1)` of row `y` with `color`, clipped to the canvas.
    pub fn fill_row(&mut self, y: usize, x0: usize, x1: usize, color: Color) {
        if y >= self.height {
            return;
        }
        let x1 = x1.min(self.width);
        if x0 >= x1 {
            return;
        }
        let row = 4 * y * self.width;
        for px in self.pix[row + 4 * x0..row + 4 * x1].chunks_exact_mut(4) {
            px[0] = color.r;
            px[1] = color.g;
            px[2] = color.b;
            px[3] = 255;
        }
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> RothkoResult<Vec<u8>> {
        let image = RgbaImage::from_raw(self.width as u32, self.height as u32, self.pix.clone())
            .ok_or_else(|| RothkoError::Encode("canvas size mismatch".to_string()))?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| RothkoError::Encode(format!("png: {}", e)))?;
        Ok(out.into_inner())
    }
}

/// Sample drawn on row `y`: `floor(y * last / (height - 1))`, kept in
/// integers so the top row always lands on the last sample.
fn row_index(y: usize, height: usize, last: usize) -> usize {
    if height <= 1 {
        return 0;
    }
    (y * last / (height - 1)).min(last)
}

/// Draws columns onto a canvas using a palette and a value to `[0, 1]` map.
pub struct Heatmap<'a, M> {
    colors: &'a [Color],
    map: M,
}

impl<'a, M> Heatmap<'a, M>
where
    M: FnMut(f64) -> f64,
{
    pub fn new(colors: &'a [Color], map: M) -> RothkoResult<Self> {
        if colors.is_empty() {
            return Err(RothkoError::InvalidParameters(
                "heatmap needs at least one colour".to_string(),
            ));
        }
        Ok(Self { colors, map })
    }

    /// Draw one column. Columns with no samples are left untouched.
    pub fn draw(&mut self, canvas: &mut Canvas, col: &Column) {
        let height = canvas.height();
        if col.data.is_empty() || height == 0 || col.w == 0 {
            return;
        }

        let color_scale = (self.colors.len() - 1) as f64;
        let last = col.data.len() - 1;

        let mut last_index = usize::MAX;
        let mut color = self.colors[0];
        for y in 0..height {
            let index = row_index(y, height, last);
            if index != last_index {
                let scaled = (self.map)(col.data[index]) * color_scale;
                let c = if scaled.is_finite() && scaled > 0.0 {
                    (scaled as usize).min(self.colors.len() - 1)
                } else {
                    0
                };
                color = self.colors[c];
                last_index = index;
            }
            canvas.fill_row(y, col.x, col.x + col.w, color);
        }
    }

    pub fn draw_all(&mut self, canvas: &mut Canvas, cols: &[Column]) {
        for col in cols {
            self.draw(canvas, col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::VIRIDIS;

    fn column(x: usize, w: usize, data: Vec<f64>) -> Column {
        Column {
            x,
            w,
            data,
            obs_sec: 0.0,
        }
    }

    #[test]
    fn test_rows_follow_samples() {
        let palette = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
        let mut canvas = Canvas::new(4, 3);
        let mut heatmap = Heatmap::new(&palette, |v| v).unwrap();
        heatmap.draw(&mut canvas, &column(1, 2, vec![0.0, 0.5, 1.0]));

        assert_eq!(canvas.get(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(canvas.get(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(canvas.get(2, 2), Some([255, 255, 255, 255]));
        assert_eq!(canvas.get(3, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_top_row_uses_last_sample() {
        let palette = [Color::new(0, 0, 0), Color::new(255, 255, 255)];
        let mut heatmap = Heatmap::new(&palette, |v| v).unwrap();
        for height in [50, 99, 2, 7, 360] {
            let mut canvas = Canvas::new(1, height);
            heatmap.draw(&mut canvas, &column(0, 1, vec![0.0, 1.0]));
            assert_eq!(canvas.get(0, height - 1), Some([255, 255, 255, 255]));
            assert_eq!(canvas.get(0, 0), Some([0, 0, 0, 255]));
        }
    }

    #[test]
    fn test_row_index_is_exact_floor() {
        for (len, height) in [(2, 50), (2, 99), (31, 360), (5, 3), (200, 799), (7, 7)] {
            let last = len - 1;
            for y in 0..height {
                assert_eq!(row_index(y, height, last), y * last / (height - 1));
            }
            assert_eq!(row_index(height - 1, height, last), last);
        }
        assert_eq!(row_index(0, 1, 10), 0);
    }

    #[test]
    fn test_every_row_matches_its_sample() {
        let data: Vec<f64> = (0..31).map(|i| i as f64 / 30.0).collect();
        let height = 360;
        let mut canvas = Canvas::new(1, height);
        let mut heatmap = Heatmap::new(&VIRIDIS, |v| v).unwrap();
        heatmap.draw(&mut canvas, &column(0, 1, data.clone()));

        for y in 0..height {
            let sample = data[y * 30 / (height - 1)];
            let c = VIRIDIS[((sample * 255.0) as usize).min(255)];
            assert_eq!(canvas.get(0, y), Some([c.r, c.g, c.b, 255]), "row {}", y);
        }
    }

    #[test]
    fn test_map_is_clamped() {
        let mut canvas = Canvas::new(1, 2);
        let mut heatmap = Heatmap::new(&VIRIDIS, |v| v).unwrap();
        heatmap.draw(&mut canvas, &column(0, 1, vec![-3.0, 7.0]));

        let low = VIRIDIS[0];
        let high = VIRIDIS[255];
        assert_eq!(canvas.get(0, 0), Some([low.r, low.g, low.b, 255]));
        assert_eq!(canvas.get(0, 1), Some([high.r, high.g, high.b, 255]));
    }

    #[test]
    fn test_column_is_clipped_to_canvas() {
        let mut canvas = Canvas::new(3, 2);
        let mut heatmap = Heatmap::new(&VIRIDIS, |_| 0.5).unwrap();
        heatmap.draw(&mut canvas, &column(2, 10, vec![1.0, 2.0]));
        assert_eq!(canvas.get(2, 1).map(|p| p[3]), Some(255));
        assert_eq!(canvas.get(1, 1).map(|p| p[3]), Some(0));
    }

    #[test]
    fn test_map_called_once_per_sample() {
        let mut calls = 0;
        let mut canvas = Canvas::new(1, 100);
        {
            let mut heatmap = Heatmap::new(&VIRIDIS, |v| {
                calls += 1;
                v
            })
            .unwrap();
            heatmap.draw(&mut canvas, &column(0, 1, vec![0.1, 0.2, 0.3, 0.4]));
        }
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_deterministic_and_png() {
        let cols = vec![
            column(0, 3, vec![0.0, 0.2, 0.9]),
            column(3, 2, vec![0.4, 0.5, 0.6]),
        ];
        let render = || {
            let mut canvas = Canvas::new(5, 8);
            Heatmap::new(&VIRIDIS, |v| v)
                .unwrap()
                .draw_all(&mut canvas, &cols);
            canvas
        };
        let a = render();
        let b = render();
        assert_eq!(a, b);

        let png = a.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
