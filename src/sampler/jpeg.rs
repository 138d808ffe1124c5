use super::SampleError;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// Converts a decoded frame to packed RGB24 and writes it as a JPEG.
pub(crate) fn write_jpeg(decoded: &frame::Video, path: &Path) -> Result<(), SampleError> {
    let (width, height) = (decoded.width(), decoded.height());

    let mut scaler = Scaler::get(
        decoded.format(),
        width,
        height,
        Pixel::RGB24,
        width,
        height,
        Flags::BILINEAR,
    )?;
    let mut rgb_frame = frame::Video::empty();
    scaler.run(decoded, &mut rgb_frame)?;

    let layout_error = || SampleError::FrameLayout { width, height };
    let pixels = packed_rows(
        rgb_frame.data(0),
        rgb_frame.stride(0),
        width as usize * 3,
        height as usize,
    )
    .ok_or_else(layout_error)?;
    let image = RgbImage::from_raw(width, height, pixels).ok_or_else(layout_error)?;
    image.save_with_format(path, ImageFormat::Jpeg)?;

    Ok(())
}

/// Strips the per-row padding ffmpeg leaves after `row_len` bytes.
fn packed_rows(data: &[u8], stride: usize, row_len: usize, rows: usize) -> Option<Vec<u8>> {
    if stride < row_len {
        return None;
    }

    let mut packed = Vec::with_capacity(row_len * rows);
    for row in 0..rows {
        let start = row * stride;
        packed.extend_from_slice(data.get(start..start + row_len)?);
    }
    Some(packed)
}
