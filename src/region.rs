// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fmt;

use image::{ImageBuffer, Pixel};
use imageproc::rect::Rect;

use crate::error::RegionError;
use crate::features::{self, FeatureCache, PcaInfo};
use crate::graph::RegionGraph;
use crate::labeler::ScanLineRun;

// Book-keeping for one retained region of a labeling pass. The region's runs
// are `region_runs[start..start+len]` in the labeler's run arena.
#[derive(Debug)]
pub(crate) struct RegionSpan {
    pub start: u32,
    pub len: u32,
    // Run group of the pass; the region's node in the adjacency graph.
    pub group: u32,
    pub value: i32,
    pub pixel_count: u32,
    pub touches_border: bool,
    pub cache: FeatureCache,
}

/// A maximal connected group of same-valued pixels found by
/// [RegionLabeler::label()](crate::labeler::RegionLabeler::label).
///
/// A `Region` is a lightweight view into storage owned by the labeler. It
/// borrows the labeler, so it cannot outlive the labeling pass that produced
/// it: the next pass needs exclusive access to the labeler.
///
/// Derived features (centroid, bounding box, boundary length, form factor,
/// PCA) are computed from the region's runs on first request and memoized
/// for the rest of the pass.
///
/// When the pass was run with
/// [create_graph](crate::labeler::RegionConstraints::create_graph), the
/// region can also report its neighbours, the regions it encloses and the
/// regions enclosing it. Rejected regions take part in the topology but are
/// never returned.
#[derive(Clone, Copy)]
pub struct Region<'a> {
    index: usize,
    span: &'a RegionSpan,
    runs: &'a [ScanLineRun],
    regions: Regions<'a>,
}

impl<'a> Region<'a> {
    /// Position of this region within its pass's [Regions].
    pub fn index(&self) -> usize {
        self.index
    }

    /// The sample value shared by all of the region's pixels.
    pub fn value(&self) -> i32 {
        self.span.value
    }

    pub fn pixel_count(&self) -> u32 {
        self.span.pixel_count
    }

    /// The region's scan line runs, in row-major order.
    pub fn runs(&self) -> &'a [ScanLineRun] {
        self.runs
    }

    /// Mean pixel coordinate. The center of the upper left image pixel is
    /// (0, 0).
    pub fn centroid(&self) -> (f32, f32) {
        self.span.cache.centroid(self.runs)
    }

    pub fn bounding_box(&self) -> Rect {
        self.span.cache.bounding_box(self.runs)
    }

    /// Number of 4-adjacencies between a region pixel and a non-region pixel.
    /// The edge of the image (or of the scan rectangle) counts as non-region.
    pub fn boundary_length(&self) -> u32 {
        self.span.cache.boundary_length(self.runs)
    }

    /// `4*pi*pixel_count / boundary_length^2`. A single pixel yields pi/4; a
    /// square yields pi/4 as well, and elongated or ragged regions yield
    /// less. Because the boundary is measured along pixel edges the value
    /// never exceeds pi/4.
    pub fn form_factor(&self) -> f32 {
        features::form_factor(self.pixel_count(), self.boundary_length())
    }

    /// Principal axes of the pixel coordinates. [PcaInfo::NULL] for a
    /// single pixel region.
    pub fn pca(&self) -> PcaInfo {
        self.span.cache.pca(self.runs)
    }

    /// Whether the region touches the edge of the scanned rectangle.
    pub fn is_border_region(&self) -> bool {
        self.span.touches_border
    }

    /// The leftmost pixel of the region's top row.
    pub fn upper_left_pixel(&self) -> (i32, i32) {
        let first = &self.runs[0];
        (first.x_start, first.y)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        // Runs are ordered by (y, x); find the first one not entirely before
        // (x, y).
        let i = self.runs.partition_point(
            |r| r.y < y || (r.y == y && r.x_end <= x));
        self.runs.get(i).is_some_and(|r| r.y == y && r.x_start <= x)
    }

    /// Iterates the region's pixel coordinates in row-major order. Prefer
    /// [runs()](Self::runs) where possible.
    pub fn pixels(&self) -> impl Iterator<Item = (i32, i32)> + 'a {
        self.runs.iter().flat_map(|r| (r.x_start..r.x_end).map(move |x| (x, r.y)))
    }

    /// Region pixels with a non-region pixel among their 4 neighbors
    /// (`thinned`) or among their 8 neighbors, in row-major order. Pixels
    /// beyond the scanned area count as non-region.
    pub fn boundary_pixels(&self, thinned: bool) -> impl Iterator<Item = (i32, i32)> + 'a {
        let region = *self;
        self.pixels().filter(move |&(x, y)| region.is_boundary_pixel(x, y, thinned))
    }

    pub fn boundary_point_count(&self, thinned: bool) -> usize {
        self.boundary_pixels(thinned).count()
    }

    fn is_boundary_pixel(&self, x: i32, y: i32, thinned: bool) -> bool {
        let outside = |dx: i32, dy: i32| !self.contains(x + dx, y + dy);
        if outside(-1, 0) || outside(1, 0) || outside(0, -1) || outside(0, 1) {
            return true;
        }
        !thinned &&
            (outside(-1, -1) || outside(1, -1) || outside(-1, 1) || outside(1, 1))
    }

    /// Regions sharing an edge with this one (or a corner, for 8-connected
    /// labeling), in discovery order.
    pub fn neighbours(&self) -> Result<impl Iterator<Item = Region<'a>> + 'a, RegionError> {
        let graph = self.graph()?;
        let regions = self.regions;
        Ok(graph.neighbours(self.span.group).iter().filter_map(
            move |&group| regions.by_group(group)))
    }

    /// Regions enclosed by this one: not touching the edge of the scanned
    /// area, and cut off from it by this region. With `direct_only`, only
    /// those adjacent to this region.
    pub fn sub_regions(&self, direct_only: bool) -> Result<Vec<Region<'a>>, RegionError> {
        let graph = self.graph()?;
        Ok(graph.enclosed_groups(self.span.group, direct_only).into_iter()
           .filter_map(|group| self.regions.by_group(group))
           .collect())
    }

    /// The innermost retained region enclosing this one, if any.
    pub fn parent(&self) -> Result<Option<Region<'a>>, RegionError> {
        let graph = self.graph()?;
        let mut group = self.span.group;
        // Bounded; without border groups in reach containment can be mutual.
        for _ in 0..graph.group_count() {
            let Some(outer) = graph.enclosing_group(group) else {
                break;
            };
            if let Some(region) = self.regions.by_group(outer) {
                return Ok(Some(region));
            }
            group = outer;
        }
        Ok(None)
    }

    /// [parent()](Self::parent), its parent and so on, innermost first.
    pub fn parent_tree(&self) -> Result<Vec<Region<'a>>, RegionError> {
        let limit = self.graph()?.group_count();
        let mut tree = Vec::new();
        let mut current = *self;
        while let Some(parent) = current.parent()? {
            if tree.len() >= limit {
                break;
            }
            tree.push(parent);
            current = parent;
        }
        Ok(tree)
    }

    fn graph(&self) -> Result<&'a RegionGraph, RegionError> {
        let graph = self.regions.graph;
        if graph.is_enabled() {
            Ok(graph)
        } else {
            Err(RegionError::GraphNotCreated)
        }
    }

    /// Sets every pixel of the region within `image` to `pixel`.
    pub fn draw_into<P: Pixel>(&self, image: &mut ImageBuffer<P, Vec<P::Subpixel>>,
                               pixel: P) {
        let (width, height) = image.dimensions();
        for run in self.runs {
            if run.y < 0 || run.y >= height as i32 {
                continue;
            }
            let x_start = run.x_start.max(0);
            let x_end = run.x_end.min(width as i32);
            for x in x_start..x_end {
                image.put_pixel(x as u32, run.y as u32, pixel);
            }
        }
    }
}

impl fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("index", &self.index)
            .field("value", &self.span.value)
            .field("pixel_count", &self.span.pixel_count)
            .field("runs", &self.runs.len())
            .finish()
    }
}

/// The regions retained by one labeling pass, in row-major discovery order
/// (ordered by each region's upper left pixel).
#[derive(Clone, Copy)]
pub struct Regions<'a> {
    spans: &'a [RegionSpan],
    runs: &'a [ScanLineRun],
    graph: &'a RegionGraph,
}

impl<'a> Regions<'a> {
    pub(crate) fn new(spans: &'a [RegionSpan], runs: &'a [ScanLineRun],
                      graph: &'a RegionGraph) -> Self {
        Regions{spans, runs, graph}
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Region<'a>> {
        let span = self.spans.get(index)?;
        let start = span.start as usize;
        Some(Region{index, span,
                    runs: &self.runs[start..start + span.len as usize],
                    regions: *self})
    }

    fn by_group(&self, group: u32) -> Option<Region<'a>> {
        self.get(self.graph.group_span(group)?)
    }

    pub fn iter(&self) -> RegionIter<'a> {
        RegionIter{regions: *self, next: 0}
    }
}

impl fmt::Debug for Regions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for Regions<'a> {
    type Item = Region<'a>;
    type IntoIter = RegionIter<'a>;

    fn into_iter(self) -> RegionIter<'a> {
        self.iter()
    }
}

pub struct RegionIter<'a> {
    regions: Regions<'a>,
    next: usize,
}

impl<'a> Iterator for RegionIter<'a> {
    type Item = Region<'a>;

    fn next(&mut self) -> Option<Region<'a>> {
        let region = self.regions.get(self.next)?;
        self.next += 1;
        Some(region)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.regions.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RegionIter<'_> {}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use super::*;

    fn span(start: u32, runs: &[ScanLineRun]) -> RegionSpan {
        RegionSpan{start, len: runs.len() as u32, group: 0, value: 255,
                   pixel_count: runs.iter().map(|r| r.len()).sum(),
                   touches_border: false,
                   cache: FeatureCache::default()}
    }

    fn run(y: i32, x_start: i32, x_end: i32) -> ScanLineRun {
        ScanLineRun{y, x_start, x_end, value: 255}
    }

    #[test]
    fn test_regions_view() {
        // Two regions sharing one arena.
        let graph = RegionGraph::default();
        let arena = vec![run(0, 0, 2), run(1, 1, 3), run(5, 5, 6)];
        let spans = vec![span(0, &arena[0..2]), span(2, &arena[2..3])];
        let regions = Regions::new(&spans, &arena, &graph);
        assert_eq!(regions.len(), 2);
        assert!(regions.get(2).is_none());
        let r0 = regions.get(0).unwrap();
        assert_eq!(r0.index(), 0);
        assert_eq!(r0.pixel_count(), 4);
        assert_eq!(r0.runs().len(), 2);
        let r1 = regions.get(1).unwrap();
        assert_eq!(r1.upper_left_pixel(), (5, 5));
        let counts: Vec<u32> = regions.iter().map(|r| r.pixel_count()).collect();
        assert_eq!(counts, vec![4, 1]);
        assert_eq!(regions.iter().len(), 2);
    }

    #[test]
    fn test_contains_and_pixels() {
        // x x . x
        // . x x .
        let graph = RegionGraph::default();
        let arena = vec![run(0, 0, 2), run(0, 3, 4), run(1, 1, 3)];
        let spans = vec![span(0, &arena)];
        let region = Regions::new(&spans, &arena, &graph).get(0).unwrap();
        assert!(region.contains(0, 0));
        assert!(region.contains(1, 0));
        assert!(!region.contains(2, 0));
        assert!(region.contains(3, 0));
        assert!(!region.contains(0, 1));
        assert!(region.contains(2, 1));
        assert!(!region.contains(3, 1));
        assert!(!region.contains(1, 2));
        assert!(!region.contains(1, -1));
        let pixels: Vec<(i32, i32)> = region.pixels().collect();
        assert_eq!(pixels, vec![(0, 0), (1, 0), (3, 0), (1, 1), (2, 1)]);
        assert_eq!(region.upper_left_pixel(), (0, 0));
    }

    #[test]
    fn test_boundary_pixels() {
        // . . . . .
        // . x x . .
        // . x x x .
        // . x x x .
        let graph = RegionGraph::default();
        let arena = vec![run(1, 1, 3), run(2, 1, 4), run(3, 1, 4)];
        let spans = vec![span(0, &arena)];
        let region = Regions::new(&spans, &arena, &graph).get(0).unwrap();
        // The center pixel only touches the outside diagonally.
        let thinned: Vec<(i32, i32)> = region.boundary_pixels(true).collect();
        assert_eq!(thinned, vec![(1, 1), (2, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)]);
        assert_eq!(region.boundary_point_count(true), 7);
        assert_eq!(region.boundary_point_count(false), 8);
        assert!(region.boundary_pixels(false).any(|p| p == (2, 2)));
    }

    #[test]
    fn test_topology_needs_graph() {
        let graph = RegionGraph::default();
        let arena = vec![run(0, 0, 2)];
        let spans = vec![span(0, &arena)];
        let region = Regions::new(&spans, &arena, &graph).get(0).unwrap();
        assert!(matches!(region.neighbours(), Err(RegionError::GraphNotCreated)));
        assert!(matches!(region.sub_regions(true), Err(RegionError::GraphNotCreated)));
        assert!(matches!(region.parent(), Err(RegionError::GraphNotCreated)));
        assert!(region.parent_tree().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_draw_into() {
        let graph = RegionGraph::default();
        let arena = vec![run(0, 2, 5), run(1, 3, 4), run(2, 0, 1)];
        let spans = vec![span(0, &arena)];
        let region = Regions::new(&spans, &arena, &graph).get(0).unwrap();
        // Narrower than the region; drawing clips.
        let mut image = GrayImage::new(4, 2);
        region.draw_into(&mut image, Luma([9]));
        assert_eq!(image.as_raw(), &vec![0, 0, 9, 9,
                                         0, 0, 0, 9]);
    }
}
