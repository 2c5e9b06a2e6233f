// 该文件是 Shoushi （手势） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 窗口与视频文件输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 输出模块
//!
//! 把叠加窗口显示的图像推送到 GStreamer 管道。
//!
//! ## URL Scheme
//!
//! - `gst://window?width=480&height=480` 悬浮预览窗口（`autovideosink`）
//! - `gst://file/output.mp4?width=1280&height=720&fps=30` 编码保存为视频文件，
//!   支持 `.mp4`、`.mkv`、`.webm`，其他扩展名按 MP4 处理
//!
//! 每帧按比例缩放到固定输出尺寸，空白处填充黑色；没有可显示的帧时输出黑帧。
//!
//! ## 参数说明
//!
//! - `width`: 输出宽度（像素），默认 640
//! - `height`: 输出高度（像素），默认 480
//! - `fps`: 帧率（帧/秒），默认 30

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    draw::{Draw, DrawError, fit_into},
  },
  present::Overlay,
  query_value,
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的输出目标: {0}")]
  UnknownTarget(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsrc 元素")]
  AppSrcNotFound,
  #[error("无法转换为 appsrc 元素")]
  AppSrcConversionFailed,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("无法创建缓冲区")]
  BufferCreationError,
  #[error("绘制设置错误: {0}")]
  DrawError(#[from] DrawError),
}

pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  draw: Draw,
  width: u32,
  height: u32,
  fps: u32,
  frame_count: AtomicU64,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

fn sink_description(url: &Url) -> Result<String, GStreamerVideoOutputError> {
  match url.host_str() {
    Some("window") => Ok("videoconvert ! autovideosink sync=false".to_string()),
    Some("file") => {
      let path = url.path();
      let encoder = if path.ends_with(".mkv") {
        "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
      } else if path.ends_with(".webm") {
        "vp8enc ! webmmux"
      } else {
        "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
      };
      Ok(format!(
        "videoconvert ! {} ! filesink location={}",
        encoder, path
      ))
    }
    other => Err(GStreamerVideoOutputError::UnknownTarget(
      other.unwrap_or_default().to_string(),
    )),
  }
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let draw = Draw::from_url(url)?;
    gst::init()?;

    let width: u32 = query_value(url, "width").unwrap_or(640);
    let height: u32 = query_value(url, "height").unwrap_or(480);
    let fps: u32 = query_value::<u32>(url, "fps").unwrap_or(30).max(1);

    let pipeline_desc = format!("appsrc name=src ! {}", sink_description(url)?);
    info!("创建输出管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("输出已启动: {}x{} @ {} fps", width, height, fps);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      draw,
      width,
      height,
      fps,
      frame_count: AtomicU64::new(0),
    })
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.appsrc.end_of_stream() {
      warn!("发送 EOS 失败: {:?}", e);
    }

    if let Some(bus) = self.pipeline.bus() {
      let _ = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(1),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止输出管道失败: {}", e);
    }

    info!(
      "输出已关闭，共写入 {} 帧",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

impl GStreamerVideoOutput {
  fn push_frame(&self, image: &RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let data = image.as_raw();
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let index = self.frame_count.fetch_add(1, Ordering::Relaxed);
    let frame_ns = 1_000_000_000 / self.fps as u64;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(index * frame_ns));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_ns));
      let mut map = buffer_ref
        .map_writable()
        .map_err(|_| GStreamerVideoOutputError::PipelineError("无法映射缓冲区".to_string()))?;
      map.copy_from_slice(data);
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerVideoOutputError::PipelineError(format!("推送缓冲区失败: {:?}", e)))?;

    Ok(())
  }
}

impl Render for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_overlay(&self, overlay: &Overlay) -> Result<(), Self::Error> {
    let mut image = match self.draw.draw_view(overlay) {
      Some(image) => fit_into(&image, self.width, self.height),
      None => RgbImage::new(self.width, self.height),
    };
    // 文字画在缩放之后，保持字号不变
    self.draw.draw_captions(&mut image, overlay);
    self.push_frame(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sink_follows_the_url_host() {
    let window = Url::parse("gst://window?width=480&height=480").unwrap();
    assert!(sink_description(&window).unwrap().contains("autovideosink"));

    let file = Url::parse("gst://file/tmp/out.webm").unwrap();
    let desc = sink_description(&file).unwrap();
    assert!(desc.contains("vp8enc"));
    assert!(desc.ends_with("location=/tmp/out.webm"));

    let unknown = Url::parse("gst://rtsp/live").unwrap();
    assert!(matches!(
      sink_description(&unknown),
      Err(GStreamerVideoOutputError::UnknownTarget(_))
    ));
  }
}
