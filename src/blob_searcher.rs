// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Multi-color blob search over RGB video frames.
//!
//! A [BlobSearcher] holds a list of color categories. For each frame,
//! [detect()](BlobSearcher::detect) thresholds the frame against every
//! category's reference color and labels the resulting binary mask, keeping
//! regions within the category's size range.
//!
//! Each category owns its mask image and its [RegionLabeler], and both are
//! reused from frame to frame. The returned [Blobs] borrow these buffers, so
//! a frame's results must be consumed before the next frame is processed.

use std::time::Instant;

use image::{DynamicImage, GrayImage, ImageBuffer, Pixel, Rgb};
use log::{debug, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::color_mask::{build_color_mask, ColorSample};
use crate::error::RegionError;
use crate::labeler::{Connectivity, RegionConstraints, RegionLabeler};
use crate::region::{Region, RegionIter};

/// A tracked color: reference color, color distance threshold, and the
/// inclusive pixel count range of acceptable blobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorCategory {
    pub color: Rgb<u8>,
    /// Pixels closer than this (Euclidean distance over the three 0..255
    /// channels) to `color` are foreground.
    pub threshold: f32,
    pub min_size: u32,
    pub max_size: u32,
}

impl ColorCategory {
    pub fn new(color: Rgb<u8>, threshold: f32, min_size: u32, max_size: u32) -> Self {
        ColorCategory{color, threshold, min_size, max_size}
    }

    fn validate(&self) -> Result<(), RegionError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(RegionError::InvalidCategory(format!(
                "threshold {} must be finite and non-negative", self.threshold)));
        }
        if self.min_size > self.max_size {
            return Err(RegionError::InvalidCategory(format!(
                "size range {}..={} is empty", self.min_size, self.max_size)));
        }
        Ok(())
    }
}

// A category plus its reusable per-frame buffers.
#[derive(Debug)]
struct CategorySlot {
    category: ColorCategory,
    mask: GrayImage,
    labeler: RegionLabeler,
}

impl CategorySlot {
    fn new(category: ColorCategory, connectivity: Connectivity) -> Self {
        let mut slot = CategorySlot{category,
                                    mask: GrayImage::new(0, 0),
                                    labeler: RegionLabeler::default()};
        slot.configure(category, connectivity);
        slot
    }

    fn configure(&mut self, category: ColorCategory, connectivity: Connectivity) {
        self.category = category;
        self.labeler.set_constraints(RegionConstraints{
            connectivity,
            ..RegionConstraints::foreground(category.min_size, category.max_size)});
        self.labeler.clear();
    }

    fn process<T: ColorSample>(&mut self, image: &ImageBuffer<Rgb<T>, Vec<T>>)
                               -> Result<(), RegionError>
    where Rgb<T>: Pixel<Subpixel = T>
    {
        build_color_mask(image, self.category.color, self.category.threshold,
                         &mut self.mask);
        self.labeler.label(&self.mask, None)?;
        Ok(())
    }
}

/// One detected blob: a region of one category's mask.
#[derive(Clone, Copy, Debug)]
pub struct Blob<'a> {
    pub region: Region<'a>,
    /// The category's reference color.
    pub color: Rgb<u8>,
    /// The category's index in the searcher.
    pub color_index: usize,
}

/// Finds blobs of several reference colors in RGB frames.
#[derive(Debug)]
pub struct BlobSearcher {
    slots: Vec<CategorySlot>,
    connectivity: Connectivity,
}

impl Default for BlobSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobSearcher {
    /// Creates a searcher whose regions are 4-connected.
    pub fn new() -> Self {
        Self::with_connectivity(Connectivity::Four)
    }

    pub fn with_connectivity(connectivity: Connectivity) -> Self {
        BlobSearcher{slots: Vec::new(), connectivity}
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn category(&self, index: usize) -> Option<&ColorCategory> {
        self.slots.get(index).map(|s| &s.category)
    }

    /// Registers a new color category and returns its index. Categories are
    /// processed, and their blobs reported, in registration order.
    ///
    /// Changing the category list discards the results of the last
    /// [detect()](Self::detect).
    pub fn add(&mut self, category: ColorCategory) -> Result<usize, RegionError> {
        category.validate()?;
        self.clear_results();
        self.slots.push(CategorySlot::new(category, self.connectivity));
        Ok(self.slots.len() - 1)
    }

    /// Removes the category at `index`; later categories move down by one.
    pub fn remove(&mut self, index: usize) -> Result<ColorCategory, RegionError> {
        self.check_index(index)?;
        self.clear_results();
        Ok(self.slots.remove(index).category)
    }

    /// Replaces the category at `index`, keeping the slot's buffers.
    pub fn adapt(&mut self, index: usize, category: ColorCategory)
                 -> Result<(), RegionError> {
        self.check_index(index)?;
        category.validate()?;
        self.clear_results();
        self.slots[index].configure(category, self.connectivity);
        Ok(())
    }

    /// Removes all categories.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Runs all categories over `image`, which must be an RGB image with 8
    /// bit, 16 bit or float channels.
    ///
    /// Any other image is rejected with [RegionError::WrongChannelCount]; the
    /// previous results are discarded in that case too, so [blobs()](Self::blobs)
    /// reports no blobs for the frame.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Blobs<'_>, RegionError> {
        let result = match image {
            DynamicImage::ImageRgb8(rgb) => self.process_all(rgb),
            DynamicImage::ImageRgb16(rgb) => self.process_all(rgb),
            DynamicImage::ImageRgb32F(rgb) => self.process_all(rgb),
            other => Err(RegionError::WrongChannelCount{
                channels: other.color().channel_count()}),
        };
        if let Err(e) = result {
            warn!("Skipping frame: {}", e);
            self.clear_results();
            return Err(e);
        }
        Ok(self.blobs())
    }

    /// Like [detect()](Self::detect), for a statically typed RGB image.
    pub fn detect_rgb<T: ColorSample>(&mut self, image: &ImageBuffer<Rgb<T>, Vec<T>>)
                                      -> Result<Blobs<'_>, RegionError>
    where Rgb<T>: Pixel<Subpixel = T>
    {
        if let Err(e) = self.process_all(image) {
            self.clear_results();
            return Err(e);
        }
        Ok(self.blobs())
    }

    /// The blobs of the last [detect()](Self::detect) call.
    pub fn blobs(&self) -> Blobs<'_> {
        Blobs{slots: &self.slots}
    }

    fn check_index(&self, index: usize) -> Result<(), RegionError> {
        if index >= self.slots.len() {
            return Err(RegionError::CategoryIndexOutOfRange{
                index, count: self.slots.len()});
        }
        Ok(())
    }

    fn clear_results(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.labeler.clear();
        }
    }

    fn process_all<T: ColorSample>(&mut self, image: &ImageBuffer<Rgb<T>, Vec<T>>)
                                   -> Result<(), RegionError>
    where Rgb<T>: Pixel<Subpixel = T>
    {
        let detect_start = Instant::now();
        // Categories share nothing but the input image.
        #[cfg(feature = "rayon")]
        self.slots.par_iter_mut().try_for_each(|slot| slot.process(image))?;
        #[cfg(not(feature = "rayon"))]
        for slot in self.slots.iter_mut() {
            slot.process(image)?;
        }
        debug!("Searched {} categories in {}x{} image in {:?}",
               self.slots.len(), image.width(), image.height(),
               detect_start.elapsed());
        Ok(())
    }
}

/// The blobs of one [BlobSearcher::detect()] call, ordered by category and
/// then by region discovery order.
#[derive(Clone, Copy)]
pub struct Blobs<'a> {
    slots: &'a [CategorySlot],
}

impl<'a> Blobs<'a> {
    pub fn len(&self) -> usize {
        self.slots.iter().map(|s| s.labeler.regions().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.labeler.regions().is_empty())
    }

    pub fn get(&self, mut index: usize) -> Option<Blob<'a>> {
        for (color_index, slot) in self.slots.iter().enumerate() {
            let regions = slot.labeler.regions();
            if index < regions.len() {
                return regions.get(index).map(
                    |region| Blob{region, color: slot.category.color, color_index});
            }
            index -= regions.len();
        }
        None
    }

    /// Blobs of the category at `color_index` only.
    pub fn of_category(&self, color_index: usize) -> impl Iterator<Item = Blob<'a>> + 'a {
        let slots = self.slots;
        slots.get(color_index).into_iter().flat_map(move |slot| {
            let color = slot.category.color;
            slot.labeler.regions().into_iter().map(
                move |region| Blob{region, color, color_index})
        })
    }

    pub fn iter(&self) -> BlobIter<'a> {
        BlobIter{slots: self.slots, next_slot: 0, current: None}
    }
}

impl std::fmt::Debug for Blobs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for Blobs<'a> {
    type Item = Blob<'a>;
    type IntoIter = BlobIter<'a>;

    fn into_iter(self) -> BlobIter<'a> {
        self.iter()
    }
}

pub struct BlobIter<'a> {
    slots: &'a [CategorySlot],
    next_slot: usize,
    // Category index, color and remaining regions of the slot being iterated.
    current: Option<(usize, Rgb<u8>, RegionIter<'a>)>,
}

impl<'a> Iterator for BlobIter<'a> {
    type Item = Blob<'a>;

    fn next(&mut self) -> Option<Blob<'a>> {
        loop {
            if let Some((color_index, color, regions)) = &mut self.current {
                if let Some(region) = regions.next() {
                    return Some(Blob{region, color: *color, color_index: *color_index});
                }
            }
            let slot = self.slots.get(self.next_slot)?;
            self.current = Some((self.next_slot, slot.category.color,
                                 slot.labeler.regions().iter()));
            self.next_slot += 1;
        }
    }
}
