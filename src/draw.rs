//! Waveform line plot (image)

use image::{ImageBuffer, Rgba};

use crate::parse::{Sample, SampleRange};

/// Draw one frame: background fill, samples joined by a 1px polyline.
/// `range` maps to the full image height (min at the bottom row, max at the top).
/// Samples outside `range` are pinned to the nearest edge.
pub fn draw_waveform_frame(
    width: u32,
    height: u32,
    samples: &[Sample],
    range: &SampleRange,
    line_color: [u8; 4],
    bg_color: [u8; 4],
) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
    let mut img = ImageBuffer::from_fn(width, height, |_, _| Rgba(bg_color));
    if samples.is_empty() || width == 0 || height == 0 {
        return img;
    }

    let points: Vec<(i64, i64)> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| (x_for_index(i, samples.len(), width), y_for_sample(s, range, height)))
        .collect();

    if let [only] = points.as_slice() {
        put(&mut img, only.0, only.1, line_color);
        return img;
    }
    for pair in points.windows(2) {
        draw_line(&mut img, pair[0], pair[1], line_color);
    }
    img
}

fn x_for_index(i: usize, n: usize, width: u32) -> i64 {
    if n <= 1 {
        return 0;
    }
    (i as i64 * (width as i64 - 1)) / (n as i64 - 1)
}

fn y_for_sample(s: Sample, range: &SampleRange, height: u32) -> i64 {
    let span = (range.max as i64 - range.min as i64).max(1);
    let v = range.clamp(s as i64) as i64 - range.min as i64;
    let rows = height as i64 - 1;
    rows - (v * rows) / span
}

fn put(img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>, x: i64, y: i64, color: [u8; 4]) {
    let (w, h) = img.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        img.put_pixel(x as u32, y as u32, Rgba(color));
    }
}

/// Bresenham between two points, both ends inclusive.
fn draw_line(
    img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    (x0, y0): (i64, i64),
    (x1, y1): (i64, i64),
    color: [u8; 4],
) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        put(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
