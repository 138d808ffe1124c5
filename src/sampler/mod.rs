//! Random frame sampling: open a saved video, draw distinct frame indices,
//! seek to and decode each one, and write the decoded frames as JPEG files.

mod jpeg;
mod stream;

use ffmpeg_next::ffi::AV_NOPTS_VALUE;
use ffmpeg_next::codec::decoder;
use ffmpeg_next::{
    self as ffmpeg, Rational, Rescale, Rounding, codec, format, frame, media, rescale, threading,
};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_FRAME_COUNT: usize = 5;

static NUM_CPUS: LazyLock<usize> = LazyLock::new(|| {
    let n = num_cpus::get();
    let num = if n > 16 { 16 } else { n };
    info!(num, "Detecting CPU cores");
    num
});

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Number of frames requested exceeds total frames in the video")]
    TooManyFrames { requested: usize, total: u64 },

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Unable to determine a valid frame rate for the video stream")]
    NoFrameRate,

    #[error("Unexpected {width}x{height} frame layout")]
    FrameLayout { width: u32, height: u32 },

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl SampleError {
    /// Whether the caller asked for something the video cannot satisfy.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SampleError::TooManyFrames { .. })
    }
}

/// Chooses `count` distinct 1-based frame indices uniformly from `[1, total]`,
/// in the order they were drawn.
pub fn choose_frame_indices<R: Rng + ?Sized>(
    rng: &mut R,
    total: u64,
    count: usize,
) -> Result<Vec<u64>, SampleError> {
    let length = usize::try_from(total).unwrap_or(usize::MAX);
    if count > length {
        return Err(SampleError::TooManyFrames {
            requested: count,
            total,
        });
    }

    Ok(rand::seq::index::sample(rng, length, count)
        .into_iter()
        .map(|index| index as u64 + 1)
        .collect())
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index}.jpg")
}

#[allow(clippy::field_reassign_with_default)]
fn decoder_threading() -> threading::Config {
    let mut config = threading::Config::default();
    config.count = *NUM_CPUS;
    config.kind = threading::Type::Frame;
    config
}

/// A video opened for random access by frame index.
pub struct FrameSampler {
    input: format::context::Input,
    decoder: decoder::Video,
    stream_index: usize,
    time_base: Rational,
    frame_rate: Rational,
    start_pts: i64,
    total_frames: u64,
}

impl FrameSampler {
    pub fn open(path: &Path) -> Result<Self, SampleError> {
        let input = format::input(&path)?;

        let (stream_index, time_base, frame_rate, start_pts, total_frames, parameters) = {
            let video = input
                .streams()
                .best(media::Type::Video)
                .ok_or(SampleError::NoVideoStream)?;
            let frame_rate = stream::valid_frame_rate(&video).ok_or(SampleError::NoFrameRate)?;
            let duration = stream::duration_secs(&video, input.duration());
            let total_frames = stream::estimate_frame_count(video.frames(), duration, frame_rate);
            let start_pts = match video.start_time() {
                AV_NOPTS_VALUE => 0,
                start => start,
            };

            (
                video.index(),
                video.time_base(),
                frame_rate,
                start_pts,
                total_frames,
                video.parameters(),
            )
        };

        let mut context = codec::context::Context::from_parameters(parameters)?;
        context.set_threading(decoder_threading());
        let decoder = context.decoder().video()?;

        debug!(
            path = %path.display(),
            stream_index,
            total_frames,
            width = decoder.width(),
            height = decoder.height(),
            "Opened video"
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            time_base,
            frame_rate,
            start_pts,
            total_frames,
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Decodes the frame with the given 1-based index.
    ///
    /// Seeks to the closest keyframe at or before the target and decodes
    /// forward. Returns `None` if the stream ends before the target is reached.
    pub fn decode_frame(&mut self, index: u64) -> Result<Option<frame::Video>, SampleError> {
        let offset = index.saturating_sub(1);
        let target = stream::frame_pts(offset, self.frame_rate, self.time_base, self.start_pts);
        // accept frames whose timestamp rounds to the target
        let half_frame = stream::frame_pts(1, self.frame_rate, self.time_base, 0) / 2;
        let threshold = target - half_frame;

        let seek_ts = target.rescale_with(self.time_base, rescale::TIME_BASE, Rounding::Up);
        if let Err(error) = self.input.seek(seek_ts, ..seek_ts) {
            // target precedes the first keyframe, rewind instead
            debug!(index, %error, "Seek failed, rewinding to start");
            self.input.seek(0, ..)?;
        }
        self.decoder.flush();

        let mut decoded = frame::Video::empty();
        for (packet_stream, packet) in self.input.packets() {
            if packet_stream.index() != self.stream_index {
                continue;
            }

            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded, threshold) {
                    return Ok(Some(decoded));
                }
            }
        }

        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if reached(&decoded, threshold) {
                return Ok(Some(decoded));
            }
        }

        Ok(None)
    }
}

fn reached(decoded: &frame::Video, threshold: i64) -> bool {
    decoded
        .timestamp()
        .or_else(|| decoded.pts())
        .is_none_or(|pts| pts >= threshold)
}

/// Writes `count` randomly chosen frames of `video` into `out_dir`.
///
/// Frames that fail to decode or encode are skipped, so the returned list
/// may be shorter than `count`. Paths are in sampling order.
pub fn extract_random_frames(
    video: &Path,
    out_dir: &Path,
    count: usize,
) -> Result<Vec<PathBuf>, SampleError> {
    let mut sampler = FrameSampler::open(video)?;
    let total = sampler.total_frames();
    let indices = choose_frame_indices(&mut rand::thread_rng(), total, count)?;
    info!(video = %video.display(), total, ?indices, "Sampling frames");

    let mut written = Vec::with_capacity(indices.len());
    for index in indices {
        let path = out_dir.join(frame_file_name(index));
        match sampler.decode_frame(index) {
            Ok(Some(decoded)) => match jpeg::write_jpeg(&decoded, &path) {
                Ok(()) => {
                    debug!(index, path = %path.display(), "Frame written");
                    written.push(path);
                }
                Err(error) => warn!(index, %error, "Failed to write frame"),
            },
            Ok(None) => warn!(index, "Frame not found before end of stream"),
            Err(error) => warn!(index, %error, "Failed to decode frame"),
        }
    }

    Ok(written)
}
