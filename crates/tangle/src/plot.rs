//! Minimal rasterizer behind the `Plot/*` functions.
//!
//! Draws a single series into a white canvas with a rectangular frame. Data
//! bounds are taken from the finite points; non-finite points break a line.

use crate::artifacts::Image;
use image::Rgba;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FRAME: Rgba<u8> = Rgba([0, 0, 0, 255]);
const SERIES: Rgba<u8> = Rgba([31, 119, 180, 255]);
const MARGIN: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Line,
    Scatter,
}

struct Bounds {
    min: f64,
    max: f64,
}

impl Bounds {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (min, max) = values
            .filter(|value| value.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
                (min.min(value), max.max(value))
            });
        if min > max {
            return None;
        }
        if min == max {
            return Some(Self {
                min: min - 0.5,
                max: max + 0.5,
            });
        }
        Some(Self { min, max })
    }

    fn fraction(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

pub fn render(xs: &[f64], ys: &[f64], style: Style, width: u32, height: u32) -> Image {
    let mut image = Image::from_pixel(width, height, BACKGROUND);
    let (w, h) = (i64::from(width), i64::from(height));
    let margin = if w > MARGIN * 4 && h > MARGIN * 4 { MARGIN } else { 0 };
    let (left, top, right, bottom) = (margin, margin, w - margin - 1, h - margin - 1);
    if right <= left || bottom <= top {
        return image;
    }

    draw_line(&mut image, (left, top), (right, top), FRAME);
    draw_line(&mut image, (right, top), (right, bottom), FRAME);
    draw_line(&mut image, (right, bottom), (left, bottom), FRAME);
    draw_line(&mut image, (left, bottom), (left, top), FRAME);

    let points = xs.iter().copied().zip(ys.iter().copied());
    let (Some(x_bounds), Some(y_bounds)) = (
        Bounds::of(points.clone().filter(|(_, y)| y.is_finite()).map(|(x, _)| x)),
        Bounds::of(points.clone().filter(|(x, _)| x.is_finite()).map(|(_, y)| y)),
    ) else {
        return image;
    };

    let to_pixel = |(x, y): (f64, f64)| -> Option<(i64, i64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let px = left + (x_bounds.fraction(x) * (right - left) as f64).round() as i64;
        let py = bottom - (y_bounds.fraction(y) * (bottom - top) as f64).round() as i64;
        Some((px, py))
    };

    match style {
        Style::Line => {
            let mut previous = None;
            for point in points {
                let current = to_pixel(point);
                match (previous, current) {
                    (Some(from), Some(to)) => draw_line(&mut image, from, to, SERIES),
                    (None, Some(to)) => plot_pixel(&mut image, to, SERIES),
                    _ => {}
                }
                previous = current;
            }
        }
        Style::Scatter => {
            for (px, py) in points.filter_map(to_pixel) {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        plot_pixel(&mut image, (px + dx, py + dy), SERIES);
                    }
                }
            }
        }
    }
    image
}

/// Set one pixel, coordinates outside the image are ignored.
fn plot_pixel(image: &mut Image, (x, y): (i64, i64), color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
        return;
    }
    image.put_pixel(x as u32, y as u32, color);
}

fn draw_line(image: &mut Image, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgba<u8>) {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let mut error = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        plot_pixel(image, (x, y), color);
        if x == x1 && y == y1 {
            break;
        }
        let doubled = 2 * error;
        if doubled >= dy {
            error += dy;
            x += sx;
        }
        if doubled <= dx {
            error += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_line_hits_plot_corners() {
        let image = render(&[0., 1.], &[0., 1.], Style::Line, 200, 100);
        assert_eq!(image.as_raw().len(), 200 * 100 * 4);
        // bottom-left and top-right corners of the plot area
        assert_eq!(*image.get_pixel(24, 75), SERIES);
        assert_eq!(*image.get_pixel(175, 24), SERIES);
        assert_eq!(*image.get_pixel(100, 5), BACKGROUND);
    }

    #[test]
    fn test_empty_series_draws_frame_only() {
        let image = render(&[], &[], Style::Scatter, 120, 120);
        assert_eq!(*image.get_pixel(24, 24), FRAME);
        assert!(image.pixels().all(|pixel| *pixel != SERIES));
    }

    #[test]
    fn test_points_outside_the_canvas_are_clipped() {
        let mut image = Image::from_pixel(4, 4, BACKGROUND);
        draw_line(&mut image, (-3, 1), (10, 1), SERIES);
        assert_eq!(*image.get_pixel(0, 1), SERIES);
        assert_eq!(*image.get_pixel(3, 1), SERIES);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_constant_series_is_centered() {
        let image = render(&[0., 1., 2.], &[5., 5., 5.], Style::Scatter, 124, 124);
        assert_eq!(*image.get_pixel(62, 62), SERIES);
    }
}
