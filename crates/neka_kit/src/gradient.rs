//! Gradient lookup tables.
//!
//! A toning filter is a list of `(offset, colour)` stops. It is baked into a 256-entry
//! table indexed by luminosity, using piecewise-linear interpolation between the two stops
//! that bracket each level.

use image::Rgb;

use crate::document::GradientStop;

pub const LUT_SIZE: usize = 256;

/// Parse `RRGGBB` (optionally `#`-prefixed). Returns `None` for anything else.
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// A 256-entry luminosity -> RGB table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientLut([Rgb<u8>; LUT_SIZE]);

impl GradientLut {
    /// Bake a table from gradient stops.
    ///
    /// - Offsets are resolved with [`Offset::value`](crate::document::Offset::value); colours
    ///   that fail to parse are black.
    /// - With more than one stop and all offsets equal, stops are spread evenly over
    ///   `[0, 1]` in definition order.
    /// - Levels outside the stop range extrapolate the first-to-last segment, clamped to
    ///   `[0, 255]`.
    /// - No stops at all gives an all-black table.
    pub fn build(stops: &[GradientStop]) -> Self {
        let mut parsed: Vec<(f64, Rgb<u8>)> = stops
            .iter()
            .map(|stop| {
                let color = parse_hex_color(&stop.color).unwrap_or_else(|| {
                    tracing::warn!("Unparseable gradient colour {:?}, using black", stop.color);
                    Rgb([0, 0, 0])
                });
                let offset = stop.offset.value();
                (if offset.is_finite() { offset } else { 0.0 }, color)
            })
            .collect();

        if parsed.is_empty() {
            return Self([Rgb([0, 0, 0]); LUT_SIZE]);
        }

        parsed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = parsed.len();
        if n > 1 && parsed.iter().all(|(o, _)| *o == parsed[0].0) {
            for (i, stop) in parsed.iter_mut().enumerate() {
                stop.0 = i as f64 / (n - 1) as f64;
            }
        }

        let mut table = [Rgb([0, 0, 0]); LUT_SIZE];
        for (level, entry) in table.iter_mut().enumerate() {
            let pos = level as f64 / (LUT_SIZE - 1) as f64;
            *entry = sample(&parsed, pos);
        }
        Self(table)
    }

    pub fn get(&self, luminosity: u8) -> Rgb<u8> {
        self.0[luminosity as usize]
    }

    pub fn as_slice(&self) -> &[Rgb<u8>] {
        &self.0
    }
}

fn sample(stops: &[(f64, Rgb<u8>)], pos: f64) -> Rgb<u8> {
    let first = stops[0];
    let last = stops[stops.len() - 1];

    // Outside the stop range the first-to-last segment is extrapolated.
    let (start, end) = stops
        .windows(2)
        .find(|w| w[0].0 <= pos && pos <= w[1].0)
        .map(|w| (w[0], w[1]))
        .unwrap_or((first, last));

    let range = end.0 - start.0;
    let ratio = if range == 0.0 {
        0.0
    } else {
        (pos - start.0) / range
    };

    let lerp = |a: u8, b: u8| {
        let v = a as f64 + (b as f64 - a as f64) * ratio;
        v.trunc().clamp(0.0, 255.0) as u8
    };
    Rgb([
        lerp(start.1[0], end.1[0]),
        lerp(start.1[1], end.1[1]),
        lerp(start.1[2], end.1[2]),
    ])
}
