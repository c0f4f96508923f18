// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! RegionDetect finds connected regions ("blobs") in images and measures
//! them. It is meant for per-frame use on live video: a labeler or blob
//! searcher that is reused across frames of a steady size does no heap
//! allocation once its buffers have grown.
//!
//! Features:
//!
//! * Labels maximal 4- or 8-connected regions of same-valued pixels in binary
//!   masks or integer grayscale images, optionally within a scan rectangle.
//! * Filters regions by sample value and by pixel count while scanning, so
//!   rejected regions cost almost nothing.
//! * Region features (centroid, bounding box, boundary length, form factor
//!   and principal axes) are computed from the region's scan line runs on
//!   first request, without revisiting the image, and cached.
//! * Optionally records which regions touch each other, answering
//!   neighbour, enclosed-region and parent queries, and lists each region's
//!   boundary pixels.
//! * Moment sums are exact integers, so centroids and orientations are
//!   stable regardless of where in the image a region lies.
//! * [BlobSearcher](blob_searcher::BlobSearcher) tracks several reference
//!   colors at once, thresholding each RGB frame by color distance.
//!
//! # Lifetimes
//!
//! Regions are views into storage owned by the
//! [RegionLabeler](labeler::RegionLabeler) that produced them. They borrow
//! the labeler, so the compiler rejects any attempt to read a region after
//! the next labeling pass has started. Copy out whatever you need to keep
//! (pixel counts, centroids, ...) before processing the next frame.
//!
//! # Conventions
//!
//! * Pixel (x, y) covers the unit square centered on (x, y); the upper left
//!   image pixel is centered on (0, 0).
//! * Boundary length counts pixel edges between the region and everything
//!   else, including the edge of the image or scan rectangle.
//! * PCA lengths are the eigenvalues of the pixel coordinate covariance.
//!   Angles are in radians, measured from the +x axis towards +y.

pub mod blob_searcher;
pub mod color_mask;
pub mod error;
pub mod features;
mod graph;
pub mod labeler;
pub mod region;

pub use blob_searcher::{Blob, BlobSearcher, Blobs, ColorCategory};
pub use error::RegionError;
pub use features::PcaInfo;
pub use labeler::{Connectivity, RegionConstraints, RegionLabeler, ScanLineRun};
pub use region::{Region, Regions};
