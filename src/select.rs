// 该文件是 Shoushi （手势） 项目的一部分。
// src/select.rs - 放大区域的检测结果选择
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

use std::{convert::Infallible, str::FromStr};

use crate::model::DetectItem;

/// 默认参与放大的类别
pub const DEFAULT_ALLOW_LABELS: [&str; 2] = ["hand", "person"];

/// 可用于放大显示的类别名单，匹配时忽略 ASCII 大小写
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
  labels: Vec<String>,
}

impl Default for AllowList {
  fn default() -> Self {
    Self::new(DEFAULT_ALLOW_LABELS)
  }
}

impl AllowList {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn contains(&self, label: &str) -> bool {
    self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }
}

impl FromStr for AllowList {
  type Err = Infallible;

  /// 逗号分隔的类别名，例如 `hand,person`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::new(
      s.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty()),
    ))
  }
}

/// 选出名单内置信度最高的检测结果
///
/// 只有严格更高的置信度才会替换当前候选，置信度相同时保留先出现的结果。
pub fn select_region<'a>(items: &'a [DetectItem], allow: &AllowList) -> Option<&'a DetectItem> {
  let mut best: Option<&DetectItem> = None;
  for item in items.iter().filter(|item| allow.contains(&item.label)) {
    if best.is_none_or(|b| item.score > b.score) {
      best = Some(item);
    }
  }
  best
}

/// 所有检测到的类别名，每行一个
pub fn summarize_labels(items: &[DetectItem]) -> String {
  items
    .iter()
    .map(|item| item.label.as_str())
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}
