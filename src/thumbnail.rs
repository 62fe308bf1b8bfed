//! Thumbnails for finished recordings.
//!
//! A [`FrameReader`] pulls the first frame out of a recording; the frame is
//! written as a JPEG into a thumbnail directory next to the video (or to a
//! caller-chosen directory). The directory carries a `.nomedia` marker so
//! media scanners skip it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use crate::frame::JPEG_QUALITY;

/// Name of the default thumbnail directory, created beside the video.
pub const THUMBNAIL_DIR: &str = "thumbnail";

/// Marker file that hides the directory from media scanners.
pub const NO_MEDIA_MARKER: &str = ".nomedia";

/// Thumbnail extraction errors.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// Reading the video or writing the thumbnail failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Decoding or encoding the frame failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// The video holds no decodable frame.
    #[error("no frame found in {}", .0.display())]
    NoFrame(PathBuf),
    /// The video path has no file name to derive the thumbnail name from.
    #[error("video path {} has no file name", .0.display())]
    NoFileName(PathBuf),
}

/// Platform media-metadata reader.
pub trait FrameReader: Send + Sync {
    /// Decode the first frame of a recording.
    fn first_frame(&self, video: &Path) -> Result<DynamicImage, ThumbnailError>;
}

/// Reads raw MJPEG streams: concatenated JPEG images.
#[derive(Debug, Default, Clone, Copy)]
pub struct MjpegFrameReader;

impl FrameReader for MjpegFrameReader {
    fn first_frame(&self, video: &Path) -> Result<DynamicImage, ThumbnailError> {
        let stream = fs::read(video)?;
        let jpeg = first_jpeg(&stream).ok_or_else(|| ThumbnailError::NoFrame(video.to_path_buf()))?;
        Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?)
    }
}

/// Slice out the first SOI..EOI image of an MJPEG stream.
#[must_use]
pub fn first_jpeg(stream: &[u8]) -> Option<&[u8]> {
    let start = stream.windows(2).position(|pair| pair == [0xFF, 0xD8])?;
    let rest = stream.get(start + 2..)?;
    let end = rest.windows(2).position(|pair| pair == [0xFF, 0xD9])?;
    stream.get(start..start + 2 + end + 2)
}

/// Where the thumbnail for `video` goes.
#[must_use]
pub fn thumbnail_dir(video: &Path, configured: Option<&Path>) -> PathBuf {
    configured.map_or_else(
        || {
            video
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(THUMBNAIL_DIR)
        },
        Path::to_path_buf,
    )
}

/// Extract the first frame of `video` and write it as `<dir>/<stem>.jpg`.
///
/// An earlier thumbnail with the same name is replaced. Returns the path
/// written.
pub fn store_thumbnail(
    reader: &dyn FrameReader,
    video: &Path,
    configured: Option<&Path>,
) -> Result<PathBuf, ThumbnailError> {
    let stem = video
        .file_stem()
        .ok_or_else(|| ThumbnailError::NoFileName(video.to_path_buf()))?;
    let image = reader.first_frame(video)?;

    let dir = thumbnail_dir(video, configured);
    fs::create_dir_all(&dir)?;
    let marker = dir.join(NO_MEDIA_MARKER);
    if !marker.exists() {
        File::create(&marker)?;
    }

    let target = dir.join(format!("{}.jpg", stem.to_string_lossy()));
    if target.exists() {
        fs::remove_file(&target)?;
    }

    let mut writer = BufWriter::new(File::create(&target)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&image.to_rgb8())?;
    writer.flush()?;
    Ok(target)
}
