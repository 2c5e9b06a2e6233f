// 该文件是 Shoushi （手势） 项目的一部分。
// src/model.rs - 检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::RgbaFrame};

/// 检测器接口
///
/// `setup` 在采集开始前调用一次，失败则终止启动；`clear` 在采集结束后释放资源。
pub trait Detector {
  type Error;

  fn setup(&mut self) -> Result<(), Self::Error>;
  fn detect(&mut self, frame: &RgbaFrame) -> Result<DetectResult, Self::Error>;
  fn clear(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 采集线程发往显示线程的检测消息
#[derive(Debug, Clone, PartialEq)]
pub enum DetectEvent {
  /// 本帧没有任何检测结果
  Empty,
  Detected {
    items: Box<[DetectItem]>,
    inference_time: Duration,
    frame_width: u32,
    frame_height: u32,
  },
}

impl DetectEvent {
  pub fn from_result(result: DetectResult, inference_time: Duration, frame: &RgbaFrame) -> Self {
    if result.is_empty() {
      DetectEvent::Empty
    } else {
      DetectEvent::Detected {
        items: result.items,
        inference_time,
        frame_width: frame.width(),
        frame_height: frame.height(),
      }
    }
  }
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayDetector, ReplayDetectorError};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxDetector, OnnxDetectorError};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[cfg(feature = "model_replay")]
  #[error("回放检测器错误: {0}")]
  ReplayDetectorError(#[from] ReplayDetectorError),
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 检测器错误: {0}")]
  OnnxDetectorError(#[from] OnnxDetectorError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum DetectorWrapper {
  #[cfg(feature = "model_replay")]
  Replay(ReplayDetector),
  #[cfg(feature = "model_onnx")]
  Onnx(Box<OnnxDetector>),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_replay")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ReplayDetector::SCHEME {
        return Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?));
      }
    }
    #[cfg(feature = "model_onnx")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == OnnxDetector::SCHEME {
        return Ok(DetectorWrapper::Onnx(Box::new(OnnxDetector::from_url(url)?)));
      }
    }
    Err(DetectorError::SchemeMismatch)
  }
}

impl Detector for DetectorWrapper {
  type Error = DetectorError;

  fn setup(&mut self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "model_replay")]
      DetectorWrapper::Replay(detector) => detector.setup().map_err(DetectorError::from),
      #[cfg(feature = "model_onnx")]
      DetectorWrapper::Onnx(detector) => detector.setup().map_err(DetectorError::from),
    }
  }

  fn detect(&mut self, frame: &RgbaFrame) -> Result<DetectResult, Self::Error> {
    match self {
      #[cfg(feature = "model_replay")]
      DetectorWrapper::Replay(detector) => detector.detect(frame).map_err(DetectorError::from),
      #[cfg(feature = "model_onnx")]
      DetectorWrapper::Onnx(detector) => detector.detect(frame).map_err(DetectorError::from),
    }
  }

  fn clear(&mut self) {
    match self {
      #[cfg(feature = "model_replay")]
      DetectorWrapper::Replay(detector) => detector.clear(),
      #[cfg(feature = "model_onnx")]
      DetectorWrapper::Onnx(detector) => detector.clear(),
    }
  }
}
