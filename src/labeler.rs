// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Connected component labeling of integer-valued images.
//!
//! [RegionLabeler] groups same-valued pixels into maximal 4- or 8-connected
//! regions, keeping only regions whose value and pixel count satisfy a
//! [RegionConstraints]. The labeler works on horizontal runs rather than on
//! pixels:
//!
//! 1. Run extraction: each row of the scan rectangle is cut into maximal
//!    same-valued spans. Spans whose value is outside the allowed value range
//!    are dropped right here, so e.g. the background of a binary mask never
//!    takes part in the following steps.
//! 2. Run linking: each run is compared with the runs of the previous row. A
//!    run that overlaps a same-valued run above inherits its provisional
//!    label; if it overlaps several, their labels are merged in a union-find
//!    structure (path compression plus union by rank).
//! 3. Materialization: runs are grouped by their resolved label, in order of
//!    first appearance. Groups whose pixel count is outside the allowed size
//!    range are dropped before any region is created. The runs of retained
//!    groups are copied contiguously into a run arena; a [Region] is just a
//!    view of one slice of that arena.
//!
//! With [RegionConstraints::create_graph] set, linking also records which
//! runs of different values touch, and materialization turns that into an
//! adjacency graph between regions for the topology queries on [Region].
//!
//! All working storage belongs to the labeler and is reused from pass to
//! pass. Once the buffers have grown to fit the video frames being processed,
//! a labeling pass performs no heap allocation.

use std::time::Instant;

use image::{ImageBuffer, Luma, Primitive};
use imageproc::rect::Rect;
pub use imageproc::region_labelling::Connectivity;
use log::debug;

use crate::error::RegionError;
use crate::features::FeatureCache;
use crate::graph::RegionGraph;
use crate::region::{Region, RegionSpan, Regions};

/// A maximal horizontal span of same-valued pixels on one image row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanLineRun {
    pub y: i32,
    /// First pixel of the run.
    pub x_start: i32,
    /// One past the last pixel of the run.
    pub x_end: i32,
    pub value: i32,
}

impl ScanLineRun {
    /// Number of pixels in the run; always at least 1.
    pub fn len(&self) -> u32 {
        (self.x_end - self.x_start) as u32
    }

    /// False for every run produced by a [RegionLabeler].
    pub fn is_empty(&self) -> bool {
        self.x_end <= self.x_start
    }
}

/// Which regions a [RegionLabeler] keeps, and how pixels connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionConstraints {
    /// Inclusive pixel count bounds.
    pub min_size: u32,
    pub max_size: u32,
    /// Inclusive sample value bounds.
    pub min_value: i32,
    pub max_value: i32,
    pub connectivity: Connectivity,
    /// Build the region adjacency graph needed by [Region::neighbours()],
    /// [Region::sub_regions()] and [Region::parent()].
    pub create_graph: bool,
}

impl Default for RegionConstraints {
    fn default() -> Self {
        RegionConstraints{min_size: 0, max_size: u32::MAX,
                          min_value: 0, max_value: 255,
                          connectivity: Connectivity::Four,
                          create_graph: false}
    }
}

impl RegionConstraints {
    /// Keeps only regions of value 255 (the foreground of a binary mask)
    /// within the given pixel count range.
    pub fn foreground(min_size: u32, max_size: u32) -> Self {
        RegionConstraints{min_size, max_size,
                          min_value: 255, max_value: 255,
                          ..Default::default()}
    }

    fn admits_value(&self, value: i32) -> bool {
        value >= self.min_value && value <= self.max_value
    }

    fn admits_size(&self, pixel_count: u32) -> bool {
        pixel_count >= self.min_size && pixel_count <= self.max_size
    }
}

/// Sample types that [RegionLabeler] can label. Every sample maps to an
/// `i32` region value.
pub trait LabelSample: Primitive {
    fn label_value(self) -> i32;
}

impl LabelSample for u8 {
    fn label_value(self) -> i32 { self as i32 }
}

impl LabelSample for u16 {
    fn label_value(self) -> i32 { self as i32 }
}

impl LabelSample for i16 {
    fn label_value(self) -> i32 { self as i32 }
}

impl LabelSample for i32 {
    fn label_value(self) -> i32 { self }
}

// Disjoint-set forest over provisional run labels.
#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn clear(&mut self) {
        self.parent.clear();
        self.rank.clear();
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        self.rank.push(0);
        label
    }

    // Two-pass find: locate the root, then point the whole path at it.
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut current = label;
        while current != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank[root_a as usize];
        let rank_b = self.rank[root_b as usize];
        if rank_a < rank_b {
            self.parent[root_a as usize] = root_b;
        } else if rank_a > rank_b {
            self.parent[root_b as usize] = root_a;
        } else {
            self.parent[root_b as usize] = root_a;
            self.rank[root_a as usize] += 1;
        }
    }
}

pub(crate) const UNASSIGNED: u32 = u32::MAX;

// A set of linked runs, accumulated during materialization before the size
// filter decides whether it becomes a region.
#[derive(Clone, Copy, Debug)]
struct RunGroup {
    value: i32,
    pixel_count: u32,
    run_count: u32,
    touches_border: bool,
    // Index into `spans`, or UNASSIGNED if the size filter rejected the group.
    span: u32,
}

/// Finds connected regions of same-valued pixels. See the module
/// documentation for the algorithm.
///
/// The regions of a pass borrow the labeler; they remain readable (including
/// their lazily computed features) until the next call to [label()](Self::label).
#[derive(Debug, Default)]
pub struct RegionLabeler {
    constraints: RegionConstraints,
    scan_rect: Option<Rect>,

    // All runs of the scan rectangle with admissible values, row-major.
    runs: Vec<ScanLineRun>,
    // runs[row_starts[i]..row_starts[i+1]] are the runs of scan row i.
    row_starts: Vec<usize>,
    // Provisional label of each run; reused for the run's group index during
    // materialization.
    run_labels: Vec<u32>,
    union_find: UnionFind,
    // Group index of each union-find root, or UNASSIGNED.
    root_groups: Vec<u32>,
    groups: Vec<RunGroup>,

    // Output arena: runs of retained regions, contiguous per region.
    region_runs: Vec<ScanLineRun>,
    spans: Vec<RegionSpan>,
    graph: RegionGraph,
}

impl RegionLabeler {
    pub fn new(constraints: RegionConstraints) -> Self {
        RegionLabeler{constraints, ..Default::default()}
    }

    pub fn constraints(&self) -> &RegionConstraints {
        &self.constraints
    }

    /// Takes effect at the next [label()](Self::label) call.
    pub fn set_constraints(&mut self, constraints: RegionConstraints) {
        self.constraints = constraints;
    }

    /// The rectangle scanned by the most recent pass; None if no pass has run
    /// yet or the image was empty.
    pub fn scan_rect(&self) -> Option<Rect> {
        self.scan_rect
    }

    /// Number of admissible runs extracted by the most recent pass.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Labels `image` within `scan_rect` (the whole image if None) and returns
    /// the regions that satisfy the constraints, in row-major discovery order.
    /// Regions from the previous pass are discarded.
    ///
    /// A [Rect] always has a positive width and height, so the only empty
    /// scan area is that of an image with zero width or height; such an
    /// image yields no regions. A `scan_rect` extending beyond the image is
    /// an error.
    pub fn label<T: LabelSample>(&mut self, image: &ImageBuffer<Luma<T>, Vec<T>>,
                                 scan_rect: Option<Rect>)
                                 -> Result<Regions<'_>, RegionError> {
        let label_start = Instant::now();
        let (width, height) = image.dimensions();
        let rect = match scan_rect {
            Some(rect) => {
                if rect.left() < 0 || rect.top() < 0 ||
                    rect.right() >= width as i32 || rect.bottom() >= height as i32
                {
                    return Err(RegionError::ScanRectOutOfBounds{rect, width, height});
                }
                Some(rect)
            },
            None if width == 0 || height == 0 => None,
            None => Some(Rect::at(0, 0).of_size(width, height)),
        };

        self.spans.clear();
        self.region_runs.clear();
        self.graph.reset(self.constraints.create_graph);
        self.scan_rect = rect;
        let Some(rect) = rect else {
            self.runs.clear();
            self.row_starts.clear();
            return Ok(self.regions());
        };

        self.extract_runs(image.as_raw(), width as usize, &rect);
        debug!("Extracted {} runs from {:?} in {:?}",
               self.runs.len(), rect, label_start.elapsed());

        let link_start = Instant::now();
        self.link_runs();
        debug!("Linked runs into {} provisional labels in {:?}",
               self.union_find.len(), link_start.elapsed());

        let materialize_start = Instant::now();
        self.materialize_regions(&rect);
        debug!("Kept {} of {} regions in {:?}; labeling took {:?}",
               self.spans.len(), self.groups.len(),
               materialize_start.elapsed(), label_start.elapsed());
        Ok(self.regions())
    }

    /// The regions found by the most recent pass.
    pub fn regions(&self) -> Regions<'_> {
        Regions::new(&self.spans, &self.region_runs, &self.graph)
    }

    /// The region of the most recent pass containing pixel (x, y), if any.
    pub fn region_at(&self, x: i32, y: i32) -> Option<Region<'_>> {
        self.regions().into_iter().find(|r| r.contains(x, y))
    }

    /// Discards the results of the most recent pass. Buffers keep their
    /// capacity.
    pub fn clear(&mut self) {
        self.spans.clear();
        self.region_runs.clear();
        self.runs.clear();
        self.row_starts.clear();
        self.graph.reset(false);
        self.scan_rect = None;
    }

    fn extract_runs<T: LabelSample>(&mut self, pixels: &[T], width: usize,
                                    rect: &Rect) {
        self.runs.clear();
        self.row_starts.clear();
        let left = rect.left() as usize;
        let right = rect.right() as usize + 1;  // One past.
        for y in rect.top()..=rect.bottom() {
            self.row_starts.push(self.runs.len());
            let row_start = y as usize * width;
            let row: &[T] = &pixels[row_start + left..row_start + right];
            let mut x = 0;
            while x < row.len() {
                let sample = row[x];
                let start = x;
                x += 1;
                while x < row.len() && row[x] == sample {
                    x += 1;
                }
                let value = sample.label_value();
                if self.constraints.admits_value(value) {
                    self.runs.push(ScanLineRun{y,
                                               x_start: (left + start) as i32,
                                               x_end: (left + x) as i32,
                                               value});
                }
            }
        }
        self.row_starts.push(self.runs.len());
    }

    fn link_runs(&mut self) {
        self.union_find.clear();
        self.run_labels.clear();
        let eight = self.constraints.connectivity == Connectivity::Eight;
        let record_edges = self.graph.is_enabled();
        let num_rows = self.row_starts.len() - 1;
        for row in 0..num_rows {
            let (prev_begin, prev_end) = if row == 0 {
                (0, 0)
            } else {
                (self.row_starts[row - 1], self.row_starts[row])
            };
            let mut prev_idx = prev_begin;
            let row_begin = self.row_starts[row];
            for i in row_begin..self.row_starts[row + 1] {
                let run = self.runs[i];
                // Runs are maximal, so touching runs of one row differ in value.
                if record_edges && i > row_begin && self.runs[i - 1].x_end == run.x_start {
                    self.graph.add_run_edge(i - 1, i);
                }
                // Runs above that are connected to `run` start before
                // search_end and end after search_start.
                let (search_start, search_end) = if eight {
                    (run.x_start - 1, run.x_end + 1)
                } else {
                    (run.x_start, run.x_end)
                };
                // Runs of the current row are sorted and disjoint, so runs
                // above that end before this window also end before the
                // windows of all later runs in the row.
                while prev_idx < prev_end && self.runs[prev_idx].x_end <= search_start {
                    prev_idx += 1;
                }
                let mut label: Option<u32> = None;
                let mut j = prev_idx;
                while j < prev_end && self.runs[j].x_start < search_end {
                    if self.runs[j].value == run.value {
                        let above = self.run_labels[j];
                        match label {
                            None => label = Some(above),
                            Some(l) => self.union_find.union(l, above),
                        }
                    } else if record_edges {
                        self.graph.add_run_edge(j, i);
                    }
                    j += 1;
                }
                let label = match label {
                    Some(l) => l,
                    None => self.union_find.make_set(),
                };
                self.run_labels.push(label);
            }
        }
    }

    fn materialize_regions(&mut self, rect: &Rect) {
        self.groups.clear();
        self.root_groups.clear();
        self.root_groups.resize(self.union_find.len(), UNASSIGNED);

        // Group runs by root label. Groups are numbered in order of their
        // first run, i.e. in row-major order of their upper left pixel.
        for i in 0..self.runs.len() {
            let run = self.runs[i];
            let root = self.union_find.find(self.run_labels[i]) as usize;
            if self.root_groups[root] == UNASSIGNED {
                self.root_groups[root] = self.groups.len() as u32;
                self.groups.push(RunGroup{value: run.value, pixel_count: 0,
                                          run_count: 0, touches_border: false,
                                          span: UNASSIGNED});
            }
            let group_index = self.root_groups[root];
            self.run_labels[i] = group_index;
            let group = &mut self.groups[group_index as usize];
            group.pixel_count += run.len();
            group.run_count += 1;
            group.touches_border |=
                run.y == rect.top() || run.y == rect.bottom() ||
                run.x_start == rect.left() || run.x_end == rect.right() + 1;
        }

        // Apply the size filter and lay out the retained groups in the arena.
        let mut arena_len = 0_u32;
        for (group_index, group) in self.groups.iter_mut().enumerate() {
            if !self.constraints.admits_size(group.pixel_count) {
                continue;
            }
            group.span = self.spans.len() as u32;
            self.spans.push(RegionSpan{start: arena_len, len: 0,
                                       group: group_index as u32,
                                       value: group.value,
                                       pixel_count: group.pixel_count,
                                       touches_border: group.touches_border,
                                       cache: FeatureCache::default()});
            arena_len += group.run_count;
        }

        // Scatter the retained runs; each region's runs stay row-major.
        self.region_runs.resize(arena_len as usize, ScanLineRun::default());
        for i in 0..self.runs.len() {
            let span_index = self.groups[self.run_labels[i] as usize].span;
            if span_index == UNASSIGNED {
                continue;
            }
            let span = &mut self.spans[span_index as usize];
            self.region_runs[(span.start + span.len) as usize] = self.runs[i];
            span.len += 1;
        }

        if self.graph.is_enabled() {
            self.graph.finish(&self.run_labels,
                              self.groups.iter().map(|g| (g.span, g.touches_border)));
        }
    }
}
