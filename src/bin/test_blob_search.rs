// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use env_logger;
use image::{DynamicImage, ImageReader, Rgb};
use imageproc::drawing;
use log::{info, warn};

use region_detect::blob_searcher::{BlobSearcher, ColorCategory};
use region_detect::labeler::Connectivity;

/// Example program for running a single-color blob search on test image(s).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Path of the file or directory to process.
    #[arg(short, long)]
    input: String,

    /// Directory where output file(s) are written.
    #[arg(short, long)]
    output: String,

    /// Reference color, as r,g,b.
    #[arg(short, long, value_parser = parse_color, default_value = "255,0,0")]
    color: Rgb<u8>,

    /// Maximum color distance of blob pixels from the reference color.
    #[arg(short, long, default_value_t = 40.0)]
    threshold: f32,

    /// Minimum blob size, in pixels.
    #[arg(long, default_value_t = 10)]
    min_size: u32,

    /// Maximum blob size, in pixels.
    #[arg(long, default_value_t = 100000)]
    max_size: u32,

    /// Connect diagonally adjacent pixels.
    #[arg(short, long, default_value_t = false)]
    eight_connected: std::primitive::bool,

    /// Log the features of every blob.
    #[arg(short, long, default_value_t = false)]
    features: std::primitive::bool,
}

fn parse_color(s: &str) -> Result<Rgb<u8>, String> {
    let channels: Vec<&str> = s.split(',').map(|c| c.trim()).collect();
    if channels.len() != 3 {
        return Err(format!("expected r,g,b but got '{}'", s));
    }
    let mut color = Rgb([0_u8; 3]);
    for (dst, src) in color.0.iter_mut().zip(channels) {
        *dst = src.parse::<u8>().map_err(|e| format!("bad channel '{}': {}", src, e))?;
    }
    Ok(color)
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let input_metadata = fs::metadata(&args.input).unwrap_or_else(|e| {
        panic!("Input file/dir '{}' does not exist? {:?}", args.input, e);
    });
    let output_metadata = fs::metadata(&args.output).unwrap_or_else(|e| {
        panic!("Output dir '{}' does not exist? {:?}", args.output, e);
    });
    assert!(output_metadata.is_dir(),
            "Output '{}' must be a directory", args.output);

    let connectivity = if args.eight_connected {
        Connectivity::Eight
    } else {
        Connectivity::Four
    };
    // One searcher for all files, so its buffers are reused the way they are
    // for video frames.
    let mut searcher = BlobSearcher::with_connectivity(connectivity);
    if let Err(e) = searcher.add(ColorCategory::new(
        args.color, args.threshold, args.min_size, args.max_size))
    {
        panic!("Bad color category: {}", e);
    }

    if input_metadata.is_dir() {
        // Enumerate and process all of the files in the directory.
        for entry in fs::read_dir(&args.input).unwrap() {
            let path = entry.unwrap().path();
            if path.is_file() {
                process_file(path.to_str().unwrap(), &args, &mut searcher);
            }
        }
    } else {
        // Process the single file.
        assert!(input_metadata.is_file());
        process_file(args.input.as_str(), &args, &mut searcher);
    }
}

fn process_file(file: &str, args: &Args, searcher: &mut BlobSearcher) {
    info!("Processing {}", file);
    let input_path = PathBuf::from(&file);
    let mut output_path = PathBuf::from(&args.output);
    output_path.push(input_path.file_name().unwrap());
    output_path.set_extension("bmp");

    let img = match ImageReader::open(&input_path).unwrap().decode() {
        Ok(img) => img,
        Err(e) => {
            warn!("Skipping {:?} due to: {:?}", input_path, e);
            return;
        },
    };
    // Drop alpha, expand gray.
    let frame = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgb16(_) |
        DynamicImage::ImageRgb32F(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    let (width, height) = (frame.width(), frame.height());

    let search_start = Instant::now();
    let blobs = match searcher.detect(&frame) {
        Ok(blobs) => blobs,
        Err(e) => {
            warn!("Skipping {:?} due to: {}", input_path, e);
            return;
        },
    };
    let elapsed = search_start.elapsed();
    info!("WxH: {}x{}", width, height);
    info!("Blob search found {} blobs in {:?}", blobs.len(), elapsed);
    info!("{}ms per megapixel\n",
          elapsed.as_secs_f64() * 1000.0 / ((width * height) as f64 / 1000000.0));

    // Paint the blobs in the reference color's complement and box them.
    let mut img_color = frame.to_rgb8();
    for blob in blobs {
        let region = blob.region;
        let complement = Rgb(blob.color.0.map(|c| 255 - c));
        region.draw_into(&mut img_color, complement);
        drawing::draw_hollow_rect_mut(&mut img_color, region.bounding_box(),
                                      Rgb::<u8>([255, 255, 255]));
        if args.features {
            let (cx, cy) = region.centroid();
            let pca = region.pca();
            info!("blob {}: {} pixels at ({:.2}, {:.2}) bbox {:?} boundary {} \
                   form factor {:.3} pca ({:.2}, {:.2}) angle {:.3}{}",
                  region.index(), region.pixel_count(), cx, cy,
                  region.bounding_box(), region.boundary_length(),
                  region.form_factor(), pca.len1, pca.len2, pca.angle1,
                  if region.is_border_region() { " [border]" } else { "" });
        }
    }
    img_color.save(output_path).unwrap();
}
