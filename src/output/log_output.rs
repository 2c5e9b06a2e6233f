// 该文件是 Shoushi （手势） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, present::Overlay};

/// 只把叠加窗口的文字写入日志，不显示图像
pub struct LogOutput;

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Render for LogOutput {
  type Error = LogOutputError;

  fn render_overlay(&self, overlay: &Overlay) -> Result<(), Self::Error> {
    let shown = match overlay.view.image() {
      Some(frame) => format!("{}x{}", frame.width(), frame.height()),
      None => "无".to_string(),
    };
    info!(
      "检测结果: [{}]，推理耗时: {}，显示: {}",
      overlay.detected_text.replace('\n', ", "),
      overlay.inference_text,
      shown
    );
    if let Some(selected) = &overlay.selected {
      info!(
        "放大目标: {} ({:.2}) {:?}",
        selected.label, selected.score, selected.bbox
      );
    }
    Ok(())
  }
}
