// 该文件是 Shoushi （手势） 项目的一部分。
// src/model/replay.rs - 检测结果回放
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 从 JSON Lines 文件逐帧回放检测结果，每行对应一帧：
//!
//! ```text
//! [{"label":"hand","score":0.91,"bbox":[0.40,0.40,0.60,0.50]}]
//! []
//! ```
//!
//! URL 形如 `replay:///path/to/detections.jsonl?loop`。

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbaFrame,
  model::{DetectItem, DetectResult, Detector},
  query_flag,
};

#[derive(Error, Debug)]
pub enum ReplayDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
  #[error("检测器尚未初始化")]
  NotReady,
}

pub struct ReplayDetector {
  path: PathBuf,
  looping: bool,
  frames: Option<Vec<Vec<DetectItem>>>,
  cursor: usize,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayDetectorError::SchemeMismatch);
    }

    Ok(ReplayDetector {
      path: PathBuf::from(url.path()),
      looping: query_flag(url, "loop"),
      frames: None,
      cursor: 0,
    })
  }
}

impl ReplayDetector {
  /// 直接使用内存中的逐帧结果，无需读取文件
  pub fn with_frames(frames: Vec<Vec<DetectItem>>, looping: bool) -> Self {
    ReplayDetector {
      path: PathBuf::new(),
      looping,
      frames: Some(frames),
      cursor: 0,
    }
  }

  fn parse(content: &str) -> Result<Vec<Vec<DetectItem>>, ReplayDetectorError> {
    content
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty())
      .map(|(idx, line)| {
        serde_json::from_str(line).map_err(|source| ReplayDetectorError::ParseError {
          line: idx + 1,
          source,
        })
      })
      .collect()
  }
}

impl Detector for ReplayDetector {
  type Error = ReplayDetectorError;

  fn setup(&mut self) -> Result<(), Self::Error> {
    if self.frames.is_some() {
      return Ok(());
    }

    info!("加载回放文件: {}", self.path.display());
    let content = std::fs::read_to_string(&self.path)?;
    let frames = Self::parse(&content)?;
    info!("回放文件包含 {} 帧检测结果", frames.len());
    self.frames = Some(frames);
    self.cursor = 0;
    Ok(())
  }

  fn detect(&mut self, frame: &RgbaFrame) -> Result<DetectResult, Self::Error> {
    let frames = self.frames.as_ref().ok_or(ReplayDetectorError::NotReady)?;

    if self.cursor >= frames.len() {
      if self.looping && !frames.is_empty() {
        self.cursor = 0;
      } else {
        debug!("回放结束，返回空结果");
        return Ok(DetectResult::default());
      }
    }

    let items = frames[self.cursor].clone();
    self.cursor += 1;
    debug!(
      "回放第 {} 帧 ({}x{}): {} 个检测结果",
      self.cursor,
      frame.width(),
      frame.height(),
      items.len()
    );
    Ok(DetectResult::from(items))
  }

  fn clear(&mut self) {
    if self.frames.take().is_none() {
      warn!("回放检测器未初始化即被清理");
    }
    self.cursor = 0;
  }
}
