// 该文件是 Shoushi （手势） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, query_flag,
  output::{
    Render,
    draw::{Draw, DrawError, Record},
  },
  present::Overlay,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("绘制设置错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 按日期分目录保存每次显示的图像及检测记录
///
/// 目录结构为 `年/月/日/时-分-秒-序号.png`，同名 `.txt` 文件记录类别与推理耗时。
/// 未指定 `always` 时只保存有检测结果的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Record,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: Draw::from_url(uri)?,
      record: Record {
        with_inference_time: true,
      },
      frame_counter: AtomicU16::new(0),
      always: query_flag(uri, "always"),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_overlay(&self, overlay: &Overlay) -> Result<(), Self::Error> {
    if !self.always && !overlay.has_detections() {
      return Ok(());
    }
    let Some(image) = self.draw.draw_overlay(overlay) else {
      return Ok(());
    };

    let path = self.frame_path()?;
    image.save(&path)?;
    self.record.record(overlay, &path)?;
    debug!("记录帧到: {}", path.display());
    Ok(())
  }
}
