// 该文件是 Shoushi （手势） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 基于 GStreamer 的帧来源，所有来源统一转换为 RGBA：
//! - `gst://screen?display=:0&fps=10` 桌面屏幕采集（`ximagesrc`）
//! - `gst://camera/dev/video0?width=640&height=480&fps=15` 摄像头（V4L2）
//! - `gst://file/path/to/video.mp4` 视频文件
//!
//! 可选参数 `rotate=90|180|270` 旋转画面。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 在 `Cargo.toml` 中启用 `gstreamer_input` 特性。
//!
//! 管道启动失败（例如没有屏幕采集权限）时构建即失败，不会产出任何帧。

use std::collections::HashMap;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的输入来源: {0}")]
  UnknownSource(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换为 appsink 元素")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("帧数据错误: {0}")]
  FrameError(#[from] crate::frame::FrameError),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GStreamerInputBuilderItem {
  ScreenSource {
    display: Option<String>,
    fps: u32,
  },
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip {
    method: u32,
  },
  TargetFormat,
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::ScreenSource { display, fps } => {
        let display = display
          .as_ref()
          .map(|d| format!(" display-name={}", d))
          .unwrap_or_default();
        format!(
          "ximagesrc{} use-damage=false ! video/x-raw,framerate={}/1",
          display, fps
        )
      }
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode, width, height, fps
        )
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
      GStreamerInputBuilderItem::TargetFormat => {
        "videoconvert ! video/x-raw,format=RGBA".to_string()
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

fn query_parse<T: std::str::FromStr>(query: &HashMap<String, String>, key: &str) -> Option<T> {
  query.get(key).and_then(|v| v.parse::<T>().ok())
}

impl GStreamerInputPipelineBuilder {
  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  fn from_parts(host: &str, path: &str, query: &HashMap<String, String>) -> Result<Self, GStreamerInputError> {
    let source = match host {
      "screen" => GStreamerInputBuilderItem::ScreenSource {
        display: query.get("display").cloned(),
        fps: query_parse(query, "fps").unwrap_or(10),
      },
      "camera" => GStreamerInputBuilderItem::CameraSource {
        camera: path.to_string(),
        io_mode: query_parse(query, "io-mode"),
        width: query_parse(query, "width").unwrap_or(640),
        height: query_parse(query, "height").unwrap_or(480),
        fps: query_parse(query, "fps").unwrap_or(15),
      },
      "file" => GStreamerInputBuilderItem::FileSource(path.to_string()),
      other => return Err(GStreamerInputError::UnknownSource(other.to_string())),
    };

    let mut items = vec![source, GStreamerInputBuilderItem::TargetFormat];
    if let Some(flip) = Self::video_flip(query.get("rotate").map(String::as_str)) {
      items.push(flip);
    }
    Ok(GStreamerInputPipelineBuilder { items })
  }

  fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=1 drop=true sync=false name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();
    info!("GStreamer 管道: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    Self::from_parts(url.host_str().unwrap_or_default(), url.path(), &query)
  }
}

/// GStreamer 帧来源，每次从 appsink 拉取一帧 RGBA 图像
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<RgbaFrame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    // 拉取失败表示流结束或管道出错
    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(e) => {
        info!("输入流结束: {}", e);
        return None;
      }
    };
    Some(convert_sample(&sample).inspect_err(|e| error!("转换帧失败: {}", e)))
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<RgbaFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgba {
    return Err(GStreamerInputError::UnsupportedFormat(video_info.format()));
  }

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;

  let row_stride = video_info.stride()[0] as usize;
  let pixel_stride = video_info.format_info().pixel_stride()[0] as usize;
  let frame = RgbaFrame::from_strided(
    map.as_slice(),
    video_info.width(),
    video_info.height(),
    pixel_stride,
    row_stride,
  )?;
  Ok(frame)
}
