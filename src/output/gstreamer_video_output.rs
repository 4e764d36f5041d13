// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # GStreamer 视频文件输出模块
//!
//! 将绘制了检测结果的帧编码保存为视频文件。
//!
//! URL: `gstvideo:///output.mp4?fps=30`，支持 `.mp4`、`.mkv`、`.avi`、`.webm`。
//! 视频尺寸取自第一帧。

use std::sync::Mutex;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::DetectResult,
  output::{Render, draw::Draw},
  url_path, url_query,
};

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Buffer creation error")]
  BufferCreationError,
  #[error("Frame size changed: expected {expected:?}, got {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// 根据文件扩展名选择编码管道
pub fn encoder_pipeline(file_path: &str) -> String {
  let encoder = if file_path.ends_with(".mkv") {
    "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
  } else if file_path.ends_with(".avi") {
    "videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux"
  } else if file_path.ends_with(".webm") {
    "videoconvert ! vp8enc ! webmmux"
  } else {
    "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
  };
  format!(
    "appsrc name=src ! {} ! filesink location=\"{}\"",
    encoder, file_path
  )
}

#[derive(Default)]
struct EncoderState {
  size: Option<(u32, u32)>,
  frame_count: u64,
}

pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: i32,
  draw: Draw,
  state: Mutex<EncoderState>,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gstvideo";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    gst::init()?;

    let fps: i32 = url_query(url, "fps")
      .and_then(|v| v.parse().ok())
      .filter(|&fps| fps > 0)
      .unwrap_or(30);
    let file_path = url_path(url);

    let pipeline_desc = encoder_pipeline(&file_path);
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      fps,
      draw: Draw::from_url(url),
      state: Mutex::new(EncoderState::default()),
    })
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();

    // 等待 EOS 写入文件
    if let Some(bus) = self.pipeline.bus() {
      let _ = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(5),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    if let Ok(state) = self.state.lock() {
      info!("Video output closed. Total frames written: {}", state.frame_count);
    }
  }
}

impl GStreamerVideoOutput {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn push_frame(&self, image: &image::RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let mut state = self
      .state
      .lock()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("Encoder state poisoned".to_string()))?;

    let size = image.dimensions();
    match state.size {
      None => {
        let caps = gst::Caps::builder("video/x-raw")
          .field("format", "RGB")
          .field("width", size.0 as i32)
          .field("height", size.1 as i32)
          .field("framerate", gst::Fraction::new(self.fps, 1))
          .build();
        self.appsrc.set_caps(Some(&caps));
        self.pipeline.set_state(gst::State::Playing)?;
        info!("Video output initialized: {}x{} @ {} fps", size.0, size.1, self.fps);
        state.size = Some(size);
      }
      Some(expected) if expected != size => {
        return Err(GStreamerVideoOutputError::FrameSizeChanged {
          expected,
          actual: size,
        });
      }
      Some(_) => {}
    }

    let data = image.as_raw();
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let timestamp = (state.frame_count * 1_000_000_000) / (self.fps as u64);
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(
        1_000_000_000 / self.fps as u64,
      ));
      let mut buffer_map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      buffer_map.copy_from_slice(data);
    }
    state.frame_count += 1;

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }
}

impl Render<Frame, DetectResult> for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.draw_detection(&frame.image, result);
    self.push_frame(&image)
  }

  fn update_fps(&self, fps: f32) {
    self.draw.set_fps(fps);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipeline_follows_extension() {
    assert!(encoder_pipeline("/tmp/out.mkv").contains("matroskamux"));
    assert!(encoder_pipeline("/tmp/out.webm").contains("vp8enc"));
    assert!(encoder_pipeline("/tmp/out.avi").contains("avimux"));
    let mp4 = encoder_pipeline("/tmp/out");
    assert!(mp4.contains("mp4mux"));
    assert!(mp4.ends_with("filesink location=\"/tmp/out\""));
  }
}
