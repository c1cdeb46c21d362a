mod color;
mod contour;
mod font;

pub use color::ColorMap;

use color::{BAR_GAP, BAR_TOTAL, BAR_WIDTH, LABEL_GAP, TICK_LEN};
use font::{FONT_HEIGHT, draw_text, text_width};

use crate::sequence::InterpolatedField;

const BACKGROUND: [u8; 3] = [0xFF, 0xFF, 0xFF];
const INK: [u8; 3] = [0x00, 0x00, 0x00];
/// Mesh point markers.
const MARKER_COLOR: [f64; 3] = [255.0, 255.0, 255.0];
const MARKER_ALPHA: f64 = 0.7;
const LINE_ALPHA: f64 = 0.3;
const TIME_BOX_ALPHA: f64 = 0.8;
const AXIS_TICKS: usize = 5;
const BAR_TICKS: usize = 5;

/// Format `v` like C's `%.{precision}e`: signed two-digit exponent.
pub fn format_sci(v: f64, precision: usize) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let s = format!("{v:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// Short label for an axis or color bar tick.
fn format_tick(v: f64) -> String {
    let a = v.abs();
    if a == 0.0 || (1e-2..1e4).contains(&a) {
        format!("{v:.2}")
    } else {
        format_sci(v, 1)
    }
}

/// Text and styling of one animation.
#[derive(Clone, Debug)]
pub struct Style {
    pub colormap: ColorMap,
    pub filled_levels: usize,
    /// Number of iso-lines over the filled field; 0 disables them.
    pub line_levels: usize,
    /// Draw out-of-hull samples as background instead of their fill value.
    pub mask_outside: bool,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/// Figure geometry: plot area (equal aspect) plus room for title, axes and color bar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FigureLayout {
    pub width: usize,
    pub height: usize,
    pub plot: Rect,
    /// Integer text and decoration scale.
    pub scale: usize,
}

impl FigureLayout {
    /// Fit a plot of data aspect ratio `aspect` (width / height) into the frame.
    pub fn fit(width: usize, height: usize, aspect: f64) -> Self {
        let s = (width.min(height) / 320).clamp(1, 4);
        let glyph_h = FONT_HEIGHT * s;
        // Title row and the y-axis label above the plot.
        let top = 4 * glyph_h;
        let bottom = 4 * glyph_h;
        let left = text_width("-0.0e+00", s) + (TICK_LEN + 2 * LABEL_GAP) * s;
        let right = BAR_TOTAL * s;

        let avail_w = width.saturating_sub(left + right).max(1);
        let avail_h = height.saturating_sub(top + bottom).max(1);
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let (w, h) = if avail_w as f64 / avail_h as f64 > aspect {
            (((avail_h as f64 * aspect).round() as usize).clamp(1, avail_w), avail_h)
        } else {
            (avail_w, ((avail_w as f64 / aspect).round() as usize).clamp(1, avail_h))
        };

        Self {
            width,
            height,
            plot: Rect {
                x: left + (avail_w - w) / 2,
                y: top + (avail_h - h) / 2,
                w,
                h,
            },
            scale: s,
        }
    }

    /// Data coordinates of the plot pixel centres for axes `extent`
    /// `[x0, x1, y0, y1]`: one x per column, one y per row in ascending y
    /// (bottom row first).
    pub fn pixel_lattice(&self, extent: [f64; 4]) -> (Vec<f64>, Vec<f64>) {
        let Rect { w, h, .. } = self.plot;
        let [x0, x1, y0, y1] = extent;
        let xs = (0..w).map(|i| x0 + (i as f64 + 0.5) / w as f64 * (x1 - x0)).collect();
        let ys = (0..h).map(|j| y0 + (j as f64 + 0.5) / h as f64 * (y1 - y0)).collect();
        (xs, ys)
    }
}

// Alpha compositing: dst = dst * (1 - alpha) + src * alpha
#[inline]
fn over_blend(buf: &mut [u8], off: usize, r: f64, g: f64, b: f64, alpha: f64) {
    buf[off] = (buf[off] as f64 * (1.0 - alpha) + r * alpha).round().min(255.0) as u8;
    buf[off + 1] = (buf[off + 1] as f64 * (1.0 - alpha) + g * alpha).round().min(255.0) as u8;
    buf[off + 2] = (buf[off + 2] as f64 * (1.0 - alpha) + b * alpha).round().min(255.0) as u8;
}

/// Bresenham line drawing with alpha-blended color, clipped to `clip`.
fn draw_line_blended(
    buf: &mut [u8], frame_width: usize,
    x0: isize, y0: isize, x1: isize, y1: isize,
    clip: Rect,
    color: [f64; 3], alpha: f64,
) {
    let mut cx = x0;
    let mut cy = y0;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx: isize = if x0 < x1 { 1 } else { -1 };
    let sy: isize = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        let inside = cx >= clip.x as isize
            && cx < (clip.x + clip.w) as isize
            && cy >= clip.y as isize
            && cy < (clip.y + clip.h) as isize;
        if inside {
            let off = (cy as usize * frame_width + cx as usize) * 4;
            over_blend(buf, off, color[0], color[1], color[2], alpha);
        }
        if cx == x1 && cy == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; cx += sx; }
        if e2 <= dx { err += dx; cy += sy; }
    }
}

fn fill_rect(buf: &mut [u8], frame_width: usize, r: Rect, color: [u8; 3]) {
    for y in r.y..r.y + r.h {
        for x in r.x..(r.x + r.w).min(frame_width) {
            let off = (y * frame_width + x) * 4;
            if off + 3 < buf.len() {
                buf[off..off + 4].copy_from_slice(&[color[0], color[1], color[2], 255]);
            }
        }
    }
}

fn blend_rect(buf: &mut [u8], frame_width: usize, r: Rect, color: [u8; 3], alpha: f64) {
    for y in r.y..r.y + r.h {
        for x in r.x..(r.x + r.w).min(frame_width) {
            let off = (y * frame_width + x) * 4;
            if off + 3 < buf.len() {
                over_blend(buf, off, color[0] as f64, color[1] as f64, color[2] as f64, alpha);
            }
        }
    }
}

/// One animation figure: a pre-rendered static layer plus the per-frame
/// field, contour lines, point overlay and time annotation.
pub struct Figure {
    layout: FigureLayout,
    style: Style,
    /// Axes extent `[x0, x1, y0, y1]` in data coordinates.
    extent: [f64; 4],
    vmin: f64,
    vmax: f64,
    base: Vec<u8>,
    /// Overlay marker centres in frame pixels.
    markers: Vec<(usize, usize)>,
}

impl Figure {
    pub fn new(layout: FigureLayout, extent: [f64; 4], vmin: f64, vmax: f64, style: Style) -> Self {
        let mut fig = Self {
            layout,
            style,
            extent,
            vmin,
            vmax,
            base: Vec::new(),
            markers: Vec::new(),
        };
        fig.base = fig.render_base();
        fig
    }

    /// Frame pixel (column, row) of a data point, if it falls in the plot.
    fn to_pixel(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (fx, fy) = self.to_pixel_f(x, y);
        let Rect { x: px, y: py, w, h } = self.layout.plot;
        let (cx, cy) = (fx.round(), fy.round());
        let inside = cx >= px as f64 && cx < (px + w) as f64 && cy >= py as f64 && cy < (py + h) as f64;
        inside.then_some((cx as usize, cy as usize))
    }

    fn to_pixel_f(&self, x: f64, y: f64) -> (f64, f64) {
        let Rect { x: px, y: py, w, h } = self.layout.plot;
        let [x0, x1, y0, y1] = self.extent;
        let sx = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.5 };
        let sy = if y1 > y0 { (y1 - y) / (y1 - y0) } else { 0.5 };
        (px as f64 + sx * w as f64 - 0.5, py as f64 + sy * h as f64 - 0.5)
    }

    /// Mesh points drawn over every frame.
    pub fn set_markers(&mut self, points: &[[f64; 3]]) {
        self.markers = points.iter().filter_map(|p| self.to_pixel(p[0], p[1])).collect();
    }

    fn band_color(&self, v: f64) -> [u8; 4] {
        let levels = self.style.filled_levels;
        let band = contour::band(v, self.vmin, self.vmax, levels);
        color::map_to_rgba(contour::band_position(band, levels), self.style.colormap)
    }

    fn render_base(&self) -> Vec<u8> {
        let FigureLayout { width, height, plot, scale: s } = self.layout;
        let mut buf = vec![0u8; width * height * 4];
        fill_rect(&mut buf, width, Rect { x: 0, y: 0, w: width, h: height }, BACKGROUND);

        // Axes frame.
        let (fx0, fy0) = (plot.x.saturating_sub(1), plot.y.saturating_sub(1));
        let (fx1, fy1) = (plot.x + plot.w, plot.y + plot.h);
        fill_rect(&mut buf, width, Rect { x: fx0, y: fy0, w: fx1 - fx0 + 1, h: 1 }, INK);
        fill_rect(&mut buf, width, Rect { x: fx0, y: fy1, w: fx1 - fx0 + 1, h: 1 }, INK);
        fill_rect(&mut buf, width, Rect { x: fx0, y: fy0, w: 1, h: fy1 - fy0 + 1 }, INK);
        fill_rect(&mut buf, width, Rect { x: fx1, y: fy0, w: 1, h: fy1 - fy0 + 1 }, INK);

        let tick = TICK_LEN * s;
        let glyph_h = FONT_HEIGHT * s;
        let [x0, x1, y0, y1] = self.extent;
        for k in 0..AXIS_TICKS {
            let f = k as f64 / (AXIS_TICKS - 1) as f64;

            // x axis: tick below the frame, label centred under it.
            let tx = plot.x + ((plot.w - 1) as f64 * f).round() as usize;
            fill_rect(&mut buf, width, Rect { x: tx, y: fy1 + 1, w: s, h: tick }, INK);
            let label = format_tick(x0 + f * (x1 - x0));
            let lx = tx.saturating_sub(text_width(&label, s) / 2);
            draw_text(&mut buf, width, lx, fy1 + 1 + tick + LABEL_GAP * s, &label, INK, s);

            // y axis: tick left of the frame, label right-aligned to it.
            let ty = plot.y + plot.h - 1 - ((plot.h - 1) as f64 * f).round() as usize;
            fill_rect(&mut buf, width, Rect { x: fx0.saturating_sub(tick), y: ty, w: tick, h: s }, INK);
            let label = format_tick(y0 + f * (y1 - y0));
            let lx = fx0.saturating_sub(tick + LABEL_GAP * s + text_width(&label, s));
            draw_text(&mut buf, width, lx, ty.saturating_sub(glyph_h / 2), &label, INK, s);
        }

        // Axis labels.
        let xl = &self.style.x_label;
        let xl_x = (plot.x + plot.w / 2).saturating_sub(text_width(xl, s) / 2);
        draw_text(&mut buf, width, xl_x, fy1 + tick + 2 * glyph_h + 2 * s, xl, INK, s);
        let yl = &self.style.y_label;
        draw_text(&mut buf, width, s, plot.y.saturating_sub(glyph_h + 3 * s), yl, INK, s);

        // Title, centred over the plot.
        let title = &self.style.title;
        let title_x = (plot.x + plot.w / 2).saturating_sub(text_width(title, s) / 2);
        draw_text(&mut buf, width, title_x, glyph_h, title, INK, s);

        self.render_color_bar(&mut buf);
        buf
    }

    /// Color bar (vmax at top, vmin at bottom) with value labels.
    fn render_color_bar(&self, buf: &mut [u8]) {
        let FigureLayout { width, plot, scale: s, .. } = self.layout;
        let bar_x = plot.x + plot.w + BAR_GAP * s;
        let bar_w = BAR_WIDTH * s;
        for y in 0..plot.h {
            let t = if plot.h > 1 { 1.0 - y as f64 / (plot.h - 1) as f64 } else { 1.0 };
            let rgba = self.band_color(self.vmin + t * (self.vmax - self.vmin));
            let row = Rect { x: bar_x, y: plot.y + y, w: bar_w, h: 1 };
            fill_rect(buf, width, row, [rgba[0], rgba[1], rgba[2]]);
        }

        let tick_x = bar_x + bar_w;
        let label_x = tick_x + (TICK_LEN + LABEL_GAP) * s;
        let glyph_h = FONT_HEIGHT * s;
        for k in 0..BAR_TICKS {
            let f = k as f64 / (BAR_TICKS - 1) as f64;
            let y = plot.y + plot.h - 1 - ((plot.h - 1) as f64 * f).round() as usize;
            fill_rect(buf, width, Rect { x: tick_x, y, w: TICK_LEN * s, h: s }, INK);
            let label = format_tick(self.vmin + f * (self.vmax - self.vmin));
            draw_text(buf, width, label_x, y.saturating_sub(glyph_h / 2), &label, INK, s);
        }
    }

    /// Field value at a data location, `None` when masked.
    fn sample(&self, field: &InterpolatedField, x: f64, y: f64) -> Option<f64> {
        let frac = |v: f64, range: [f64; 2], n: usize| {
            if n < 2 || !(range[1] > range[0]) {
                return 0.0;
            }
            ((v - range[0]) / (range[1] - range[0]) * (n - 1) as f64).clamp(0.0, (n - 1) as f64)
        };
        let fi = frac(x, field.x_range, field.nx);
        let fj = frac(y, field.y_range, field.ny);
        let at = |i: usize, j: usize| j * field.nx + i;

        if self.style.mask_outside && !field.inside[at(fi.round() as usize, fj.round() as usize)] {
            return None;
        }

        // Bilinear interpolation between lattice nodes.
        let i0 = fi.floor() as usize;
        let j0 = fj.floor() as usize;
        let i1 = (i0 + 1).min(field.nx - 1);
        let j1 = (j0 + 1).min(field.ny - 1);
        let (tx, ty) = (fi - i0 as f64, fj - j0 as f64);
        let v = field.values[at(i0, j0)] * (1.0 - tx) * (1.0 - ty)
            + field.values[at(i1, j0)] * tx * (1.0 - ty)
            + field.values[at(i0, j1)] * (1.0 - tx) * ty
            + field.values[at(i1, j1)] * tx * ty;
        Some(v)
    }

    /// Render one frame: static layer, filled field, contour lines, point
    /// overlay and the time annotation.
    pub fn draw_frame(&self, field: &InterpolatedField, time: f64) -> Vec<u8> {
        let FigureLayout { width, height, plot, scale: s } = self.layout;
        let mut buf = self.base.clone();
        let [x0, x1, y0, y1] = self.extent;
        // Plot area clipped to the frame.
        let clip = Rect {
            w: plot.w.min(width.saturating_sub(plot.x)),
            h: plot.h.min(height.saturating_sub(plot.y)),
            ..plot
        };

        for py in 0..clip.h {
            let y = y1 - (py as f64 + 0.5) / plot.h as f64 * (y1 - y0);
            for px in 0..clip.w {
                let x = x0 + (px as f64 + 0.5) / plot.w as f64 * (x1 - x0);
                let Some(v) = self.sample(field, x, y) else { continue };
                let rgba = self.band_color(v);
                let off = ((plot.y + py) * width + plot.x + px) * 4;
                buf[off..off + 4].copy_from_slice(&rgba);
            }
        }

        if self.style.line_levels > 0 {
            let lattice_to_pixel = |p: [f64; 2]| {
                let span = |range: [f64; 2], n: usize| {
                    if n > 1 { (range[1] - range[0]) / (n - 1) as f64 } else { 0.0 }
                };
                let x = field.x_range[0] + p[0] * span(field.x_range, field.nx);
                let y = field.y_range[0] + p[1] * span(field.y_range, field.ny);
                let (fx, fy) = self.to_pixel_f(x, y);
                (fx.round() as isize, fy.round() as isize)
            };
            for level in contour::line_levels(self.vmin, self.vmax, self.style.line_levels) {
                for [a, b] in contour::isolines(&field.values, field.nx, field.ny, level) {
                    let (ax, ay) = lattice_to_pixel(a);
                    let (bx, by) = lattice_to_pixel(b);
                    draw_line_blended(&mut buf, width, ax, ay, bx, by, clip, [0.0; 3], LINE_ALPHA);
                }
            }
        }

        // 3x3 (scaled) diamond per marker.
        let r = s as isize;
        for &(mx, my) in &self.markers {
            for dy in -r..=r {
                for dx in -(r - dy.abs())..=(r - dy.abs()) {
                    let (x, y) = (mx as isize + dx, my as isize + dy);
                    let inside = x >= clip.x as isize
                        && x < (clip.x + clip.w) as isize
                        && y >= clip.y as isize
                        && y < (clip.y + clip.h) as isize;
                    if inside {
                        let off = (y as usize * width + x as usize) * 4;
                        let [mr, mg, mb] = MARKER_COLOR;
                        over_blend(&mut buf, off, mr, mg, mb, MARKER_ALPHA);
                    }
                }
            }
        }

        self.draw_time_box(&mut buf, time);
        buf
    }

    /// `Time: 1.00e-12 s` in a translucent white box at the plot's top-left.
    fn draw_time_box(&self, buf: &mut [u8], time: f64) {
        let FigureLayout { width, plot, scale: s, .. } = self.layout;
        let text = format!("Time: {} s", format_sci(time, 2));
        let pad = 2 * s;
        let bx = plot.x + (plot.w as f64 * 0.02) as usize;
        let by = plot.y + (plot.h as f64 * 0.02) as usize;
        let rect = Rect {
            x: bx,
            y: by,
            w: text_width(&text, s) + 2 * pad,
            h: FONT_HEIGHT * s + 2 * pad,
        };
        blend_rect(buf, width, rect, BACKGROUND, TIME_BOX_ALPHA);
        draw_text(buf, width, bx + pad, by + pad, &text, INK, s);
    }
}
