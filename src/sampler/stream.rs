use ffmpeg_next::ffi::{AV_NOPTS_VALUE, AV_TIME_BASE};
use ffmpeg_next::{Rational, Rescale, Stream};
use tracing::debug;

// Helper function: checks if a Rational is valid (numerator and denominator are both > 0)
fn is_rational_valid(r: Rational) -> bool {
    r.numerator() > 0 && r.denominator() > 0
}

/// Gets a valid frame rate from the video stream, preferring `avg_frame_rate`
/// and falling back to `r_frame_rate`.
pub(crate) fn valid_frame_rate(stream: &Stream) -> Option<Rational> {
    let avg_fps = stream.avg_frame_rate();
    if is_rational_valid(avg_fps) {
        return Some(avg_fps);
    }

    let r_fps = stream.rate();
    debug!(
        "avg_frame_rate {}/{} unusable, trying r_frame_rate {}/{}",
        avg_fps.numerator(),
        avg_fps.denominator(),
        r_fps.numerator(),
        r_fps.denominator()
    );
    is_rational_valid(r_fps).then_some(r_fps)
}

/// Duration of the stream in seconds, falling back to the container duration.
pub(crate) fn duration_secs(stream: &Stream, container_duration: i64) -> Option<f64> {
    let duration = stream.duration();
    if duration != AV_NOPTS_VALUE && duration > 0 {
        return Some(duration as f64 * f64::from(stream.time_base()));
    }

    if container_duration != AV_NOPTS_VALUE && container_duration > 0 {
        return Some(container_duration as f64 / f64::from(AV_TIME_BASE));
    }

    None
}

/// Total frame count: the container's own count when it records one,
/// otherwise duration times frame rate.
pub(crate) fn estimate_frame_count(
    nb_frames: i64,
    duration_secs: Option<f64>,
    frame_rate: Rational,
) -> u64 {
    if nb_frames > 0 {
        return nb_frames as u64;
    }

    match duration_secs {
        Some(secs) if secs > 0.0 => (secs * f64::from(frame_rate)).round() as u64,
        _ => 0,
    }
}

/// Presentation timestamp (in `time_base`) of the frame `offset` frames after `start_pts`.
pub(crate) fn frame_pts(
    offset: u64,
    frame_rate: Rational,
    time_base: Rational,
    start_pts: i64,
) -> i64 {
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    start_pts.saturating_add(offset.rescale(frame_rate.invert(), time_base))
}
