// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use imageproc::rect::Rect;
use thiserror::Error;

/// Errors reported by [RegionLabeler](crate::labeler::RegionLabeler) and
/// [BlobSearcher](crate::blob_searcher::BlobSearcher).
///
/// Every variant signals a caller contract violation (an invalid argument).
/// Degenerate geometry such as a single pixel region is not an error; the
/// feature accessors return documented sentinel values instead.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Scan rectangle {rect:?} is not within the {width}x{height} image")]
    ScanRectOutOfBounds { rect: Rect, width: u32, height: u32 },

    #[error("Expected a 3 channel color image, got {channels} channel(s)")]
    WrongChannelCount { channels: u8 },

    #[error("Category index {index} is out of range ({count} categories)")]
    CategoryIndexOutOfRange { index: usize, count: usize },

    #[error("Invalid color category: {0}")]
    InvalidCategory(String),

    #[error("Region topology requested, but the labeling pass did not create a region graph")]
    GraphNotCreated,
}

impl RegionError {
    /// Whether the error belongs to the invalid-argument class. True for
    /// every current variant.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            RegionError::ScanRectOutOfBounds { .. } |
            RegionError::WrongChannelCount { .. } |
            RegionError::CategoryIndexOutOfRange { .. } |
            RegionError::InvalidCategory(_) |
            RegionError::GraphNotCreated => true,
        }
    }
}
