// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::{GrayImage, ImageBuffer, Luma, Pixel, Primitive, Rgb};
use log::debug;

/// Color channel sample types accepted by [build_color_mask()]. Samples are
/// compared on the 0..255 scale of 8-bit channels.
pub trait ColorSample: Primitive + Sync {
    fn to_u8_scale(self) -> f32;
}

impl ColorSample for u8 {
    fn to_u8_scale(self) -> f32 { self as f32 }
}

impl ColorSample for u16 {
    fn to_u8_scale(self) -> f32 { self as f32 / 257.0 }
}

// Float images follow the `image` crate convention of 0.0..1.0 channels.
impl ColorSample for f32 {
    fn to_u8_scale(self) -> f32 { self * 255.0 }
}

/// Thresholds `image` by color distance. A mask pixel is set to 255 when the
/// squared Euclidean distance between the image pixel and `color` is strictly
/// less than `threshold` squared, and to 0 otherwise.
///
/// `mask` is reallocated only if its dimensions differ from `image`'s; all of
/// its pixels are overwritten.
pub fn build_color_mask<T: ColorSample>(image: &ImageBuffer<Rgb<T>, Vec<T>>,
                                        color: Rgb<u8>, threshold: f32,
                                        mask: &mut GrayImage)
where Rgb<T>: Pixel<Subpixel = T>
{
    let (width, height) = image.dimensions();
    if mask.dimensions() != (width, height) {
        debug!("Allocating {}x{} mask", width, height);
        *mask = GrayImage::new(width, height);
    }
    let [ref_r, ref_g, ref_b] = color.0.map(|c| c as f32);
    let threshold_2 = threshold * threshold;
    for (dst, src) in mask.pixels_mut().zip(image.pixels()) {
        let [r, g, b] = src.0;
        let dr = r.to_u8_scale() - ref_r;
        let dg = g.to_u8_scale() - ref_g;
        let db = b.to_u8_scale() - ref_b;
        let distance_2 = dr * dr + dg * dg + db * db;
        *dst = Luma([if distance_2 < threshold_2 { 255 } else { 0 }]);
    }
}
