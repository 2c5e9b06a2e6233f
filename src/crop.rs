// 该文件是 Shoushi （手势） 项目的一部分。
// src/crop.rs - 检测区域到放大裁剪区域的换算
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

//! # 裁剪区域计算
//!
//! 根据选中的检测框计算叠加窗口中要放大显示的区域：
//!
//! 1. 归一化坐标截到 `[0, 1]`（NaN 视为 0）后换算为像素坐标（向零截断）；
//! 2. 每个方向按 `padding × 边长` 外扩，并限制在帧内；
//! 3. 取外扩后宽高的较大者作为正方形边长，以原检测框中心重新居中；
//! 4. 某一方向被边界截短时，从触发截断的边界一侧往回滑动；
//! 5. 再次限制在帧内，宽或高不为正时返回 [`CropError::Degenerate`]。
//!
//! 第 4 步逐轴处理，两个方向都放不下正方形时结果不是正方形。

use thiserror::Error;

/// 默认外扩比例（每边 20%）
pub const DEFAULT_PADDING: f32 = 0.2;

/// 像素坐标系下的矩形，`(x, y)` 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl CropRect {
  pub fn x2(&self) -> u32 {
    self.x.saturating_add(self.width)
  }

  pub fn y2(&self) -> u32 {
    self.y.saturating_add(self.height)
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 覆盖整帧的矩形
  pub fn full(width: u32, height: u32) -> Self {
    Self {
      x: 0,
      y: 0,
      width,
      height,
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
  #[error("裁剪区域无效: ({x1},{y1}) 到 ({x2},{y2})")]
  Degenerate { x1: i64, y1: i64, x2: i64, y2: i64 },
}

/// 外扩比例上限，超出的取值按上限处理
pub const MAX_PADDING: f32 = 10.0;

/// 一条坐标轴上的区间换算
struct Axis {
  lo: i64,
  hi: i64,
  bound: i64,
}

/// 归一化坐标限制在 `[0, 1]`，NaN 视为 0
pub(crate) fn unit(value: f32) -> f32 {
  if value.is_nan() {
    0.0
  } else {
    value.clamp(0.0, 1.0)
  }
}

impl Axis {
  fn new(min: f32, max: f32, bound: u32) -> Self {
    let scale = bound as f32;
    let bound = bound as i64;
    Self {
      lo: ((unit(min) * scale) as i64).min(bound),
      hi: ((unit(max) * scale) as i64).min(bound),
      bound,
    }
  }

  fn expanded_len(&self, padding: f32) -> i64 {
    let expand = (self.hi.saturating_sub(self.lo) as f32 * padding) as i64;
    let lo = self.lo.saturating_sub(expand).max(0);
    let hi = self.hi.saturating_add(expand).min(self.bound);
    hi.saturating_sub(lo)
  }

  fn square_around_centre(&self, size: i64) -> (i64, i64) {
    let centre = (self.lo + self.hi) / 2;
    let mut lo = centre.saturating_sub(size / 2).max(0);
    let mut hi = centre.saturating_add(size / 2).min(self.bound);

    if hi - lo < size {
      if lo == 0 {
        hi = size;
      } else if hi == self.bound {
        lo = self.bound.saturating_sub(size);
      }
    }

    (lo.max(0), hi.min(self.bound))
  }
}

/// 外扩比例限制在 `[0, MAX_PADDING]`，NaN 视为不外扩
fn sanitize_padding(padding: f32) -> f32 {
  if padding.is_nan() {
    0.0
  } else {
    padding.clamp(0.0, MAX_PADDING)
  }
}

/// 计算放大显示的裁剪区域
///
/// `bbox` 为归一化坐标 `[x_min, y_min, x_max, y_max]`，超出 `[0, 1]` 的分量先截到边界。
/// 结果保证完全位于 `frame_width × frame_height` 之内且宽高为正，否则返回错误，
/// 调用方应显示整帧。
pub fn crop_region(
  bbox: &[f32; 4],
  frame_width: u32,
  frame_height: u32,
  padding: f32,
) -> Result<CropRect, CropError> {
  let padding = sanitize_padding(padding);
  let x = Axis::new(bbox[0], bbox[2], frame_width);
  let y = Axis::new(bbox[1], bbox[3], frame_height);

  let size = x.expanded_len(padding).max(y.expanded_len(padding));

  let (x1, x2) = x.square_around_centre(size);
  let (y1, y2) = y.square_around_centre(size);

  if x2 - x1 <= 0 || y2 - y1 <= 0 {
    return Err(CropError::Degenerate { x1, y1, x2, y2 });
  }

  Ok(CropRect {
    x: x1 as u32,
    y: y1 as u32,
    width: (x2 - x1) as u32,
    height: (y2 - y1) as u32,
  })
}
