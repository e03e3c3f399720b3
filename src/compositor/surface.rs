//! RGBA drawing surface
//!
//! Nearest-neighbor scaling and solid fills; enough to stack a screen frame
//! and a camera overlay.

use super::layout::Rect;
use crate::capture::VideoFrame;

pub const BLACK: [u8; 4] = [0, 0, 0, 255];
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// A fixed-size RGBA8 pixel buffer
#[derive(Debug, Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };
        surface.clear(BLACK);
        surface
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Fill the whole surface with one color
    pub fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Fill a rectangle, clipped to the surface
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let stride = self.width as usize * 4;
        for y in y0..y1 {
            let row = &mut self.pixels[y * stride..(y + 1) * stride];
            for px in row[x0 * 4..x1 * 4].chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
        }
    }

    /// Paint the band between `outer` and `inner`. `inner` is left untouched.
    pub fn fill_frame_band(&mut self, outer: Rect, inner: Rect, color: [u8; 4]) {
        // top, bottom, left, right strips
        self.fill_rect(
            Rect::new(outer.x, outer.y, outer.width, (inner.y - outer.y).max(0) as u32),
            color,
        );
        self.fill_rect(
            Rect::new(outer.x, inner.bottom(), outer.width, (outer.bottom() - inner.bottom()).max(0) as u32),
            color,
        );
        self.fill_rect(
            Rect::new(outer.x, inner.y, (inner.x - outer.x).max(0) as u32, inner.height),
            color,
        );
        self.fill_rect(
            Rect::new(inner.right(), inner.y, (outer.right() - inner.right()).max(0) as u32, inner.height),
            color,
        );
    }

    /// Scale `frame` into `dest` with nearest-neighbor sampling.
    /// Frames whose buffer does not match their size are skipped.
    pub fn draw_frame(&mut self, frame: &VideoFrame, dest: Rect) {
        let (fw, fh, data) = (frame.width(), frame.height(), frame.data());
        if fw == 0 || fh == 0 || dest.width == 0 || dest.height == 0 {
            return;
        }
        if data.len() != fw as usize * fh as usize * 4 {
            tracing::debug!("Skipping malformed {}x{} frame ({} bytes)", fw, fh, data.len());
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };

        // Source column for each destination column, computed once per draw
        let src_cols: Vec<usize> = (x0..x1)
            .map(|x| {
                let dx = (x as i64 - dest.x) as u64;
                ((dx * fw as u64 / dest.width as u64) as usize).min(fw as usize - 1)
            })
            .collect();

        let stride = self.width as usize * 4;
        let src_stride = fw as usize * 4;

        for y in y0..y1 {
            let dy = (y as i64 - dest.y) as u64;
            let src_y = ((dy * fh as u64 / dest.height as u64) as usize).min(fh as usize - 1);
            let src_row = &data[src_y * src_stride..(src_y + 1) * src_stride];
            let dst_row = &mut self.pixels[y * stride..(y + 1) * stride];

            for (i, &src_x) in src_cols.iter().enumerate() {
                let d = (x0 + i) * 4;
                let s = src_x * 4;
                dst_row[d..d + 3].copy_from_slice(&src_row[s..s + 3]);
                dst_row[d + 3] = 255;
            }
        }
    }

    /// Copy the current content out as a frame
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame::from_rgba_unchecked(self.width, self.height, self.pixels.clone())
    }

    /// Intersect with the surface bounds; `None` when nothing is visible
    fn clip(&self, rect: Rect) -> Option<(usize, usize, usize, usize)> {
        let x0 = rect.x.max(0);
        let y0 = rect.y.max(0);
        let x1 = rect.right().min(self.width as i64);
        let y1 = rect.bottom().min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_surface_is_black() {
        let surface = Surface::new(4, 3);
        assert_eq!(surface.pixel(0, 0), Some(BLACK));
        assert_eq!(surface.pixel(3, 2), Some(BLACK));
        assert_eq!(surface.pixel(4, 0), None);
    }

    #[test]
    fn test_draw_frame_scales_up() {
        // 2x1 source: red | blue, drawn into a 4x2 area
        let mut data = Vec::new();
        data.extend_from_slice(&[255, 0, 0, 255]);
        data.extend_from_slice(&[0, 0, 255, 255]);
        let frame = VideoFrame::new(2, 1, data).unwrap();

        let mut surface = Surface::new(4, 2);
        surface.draw_frame(&frame, Rect::new(0, 0, 4, 2));

        assert_eq!(surface.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(2, 0), Some([0, 0, 255, 255]));
        assert_eq!(surface.pixel(3, 1), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_draw_frame_clips_to_surface() {
        let frame = VideoFrame::solid(2, 2, WHITE);
        let mut surface = Surface::new(4, 4);
        surface.draw_frame(&frame, Rect::new(2, 2, 4, 4));

        assert_eq!(surface.pixel(1, 1), Some(BLACK));
        assert_eq!(surface.pixel(2, 2), Some(WHITE));
        assert_eq!(surface.pixel(3, 3), Some(WHITE));
    }

    #[test]
    fn test_frame_band_leaves_inner_untouched() {
        let mut surface = Surface::new(10, 10);
        let inner = Rect::new(3, 3, 4, 4);
        surface.fill_frame_band(inner.inflate(2), inner, WHITE);

        assert_eq!(surface.pixel(1, 1), Some(WHITE));
        assert_eq!(surface.pixel(8, 8), Some(WHITE));
        assert_eq!(surface.pixel(2, 5), Some(WHITE));
        assert_eq!(surface.pixel(3, 3), Some(BLACK));
        assert_eq!(surface.pixel(6, 6), Some(BLACK));
        assert_eq!(surface.pixel(0, 0), Some(BLACK));
        assert_eq!(surface.pixel(9, 9), Some(BLACK));
    }
}
