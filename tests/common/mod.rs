#![allow(dead_code)]

use ffmpeg_next::codec::encoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::{self as ffmpeg, Packet, Rational, codec, format, frame};
use frame_sampler::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub const SAMPLE_FRAMES: usize = 24;
pub const SAMPLE_WIDTH: u32 = 64;
pub const SAMPLE_HEIGHT: u32 = 48;
const SAMPLE_FPS: i32 = 12;

/// Test harness that runs the server on a free port with its own workspace
pub struct TestServer {
    _handle: JoinHandle<()>,
    port: u16,
    workspace: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Self {
        // Only open when debugging
        // tracing_subscriber::fmt::init();

        let port = portpicker::pick_unused_port().expect("No available port");
        let workspace = tempfile::tempdir().expect("Failed to create workspace");

        let config = Config {
            listen_on_port: port,
            workspace: workspace.path().display().to_string(),
            temp_dir: Some(workspace.path().join("frames").display().to_string()),
            ..Default::default()
        };

        let handle = tokio::spawn(async move {
            frame_sampler::run(config).await.expect("Server failed");
        });

        // Poll until server is ready
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        TestServer {
            _handle: handle,
            port,
            workspace,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.workspace.path().join("uploads")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.workspace.path().join("frames")
    }

    /// Writes a sample clip into the workspace and returns its bytes
    pub fn sample_video(&self) -> Vec<u8> {
        let path = self.workspace.path().join("sample.mp4");
        write_sample_video(&path, SAMPLE_FRAMES).expect("Failed to write sample video");
        std::fs::read(path).unwrap()
    }

    /// Posts `data` as the `video` field of a multipart form
    pub async fn upload(&self, file_name: &str, data: Vec<u8>, query: &str) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str("video/mp4")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("video", part);

        self.client
            .post(self.url(&format!("/extract-frames{query}")))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Luma of the flat frame at 0-based `offset` in a clip of `frames` frames
pub fn sample_shade(offset: usize, frames: usize) -> u8 {
    (16 + offset * 200 / frames.max(1)) as u8
}

/// Grey level a decoded sample frame has after limited range YUV to RGB conversion
pub fn sample_grey(index: u64) -> f64 {
    let shade = sample_shade(index as usize - 1, SAMPLE_FRAMES);
    (f64::from(shade) - 16.0) * 255.0 / 219.0
}

/// Sample frame index whose grey level is closest to `grey`
pub fn nearest_sample_index(grey: f64) -> u64 {
    (1..=SAMPLE_FRAMES as u64)
        .min_by(|a, b| {
            let da = (sample_grey(*a) - grey).abs();
            let db = (sample_grey(*b) - grey).abs();
            da.total_cmp(&db)
        })
        .unwrap()
}

/// Encodes `frames` flat grey frames of increasing brightness as MPEG-4 in an mp4 container
pub fn write_sample_video(path: &Path, frames: usize) -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;

    let mut octx = format::output(&path)?;
    let codec = encoder::find(codec::Id::MPEG4).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
    let time_base = Rational::new(1, SAMPLE_FPS);

    let mut video = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    video.set_width(SAMPLE_WIDTH);
    video.set_height(SAMPLE_HEIGHT);
    video.set_format(Pixel::YUV420P);
    video.set_time_base(time_base);
    video.set_frame_rate(Some(Rational::new(SAMPLE_FPS, 1)));
    if global_header {
        video.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = video.open_as(codec)?;

    let stream_index = {
        let mut stream = octx.add_stream(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        stream.index()
    };

    octx.write_header()?;
    let stream_time_base = octx.stream(stream_index).unwrap().time_base();

    for index in 0..frames {
        let mut frame = frame::Video::new(Pixel::YUV420P, SAMPLE_WIDTH, SAMPLE_HEIGHT);
        frame.data_mut(0).fill(sample_shade(index, frames));
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame.set_pts(Some(index as i64));

        encoder.send_frame(&frame)?;
        write_packets(&mut encoder, &mut octx, stream_index, time_base, stream_time_base)?;
    }

    encoder.send_eof()?;
    write_packets(&mut encoder, &mut octx, stream_index, time_base, stream_time_base)?;
    octx.write_trailer()?;

    Ok(())
}

fn write_packets(
    encoder: &mut encoder::video::Encoder,
    octx: &mut format::context::Output,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
) -> Result<(), ffmpeg::Error> {
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(encoder_time_base, stream_time_base);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}
