// 该文件是 Shoushi （手势） 项目的一部分。
// src/frame.rs - RGBA 帧定义
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

use image::{RgbImage, RgbaImage};
use thiserror::Error;

use crate::crop::CropRect;

pub const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸无效: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
  #[error("不支持的像素步长: {0}（仅支持 RGBA 4 字节）")]
  UnsupportedPixelStride(usize),
  #[error("行步长 {row_stride} 小于一行像素所需的 {required} 字节")]
  RowStrideTooSmall { row_stride: usize, required: usize },
  #[error("数据长度不匹配: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferTooShort { expected: usize, actual: usize },
  #[error("裁剪区域 {region:?} 超出帧范围 {width}x{height}")]
  CropOutOfBounds {
    region: CropRect,
    width: u32,
    height: u32,
  },
}

/// 一帧 RGBA 图像，宽高在运行时确定
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
  image: RgbaImage,
}

impl RgbaFrame {
  /// 从紧凑排列的 RGBA 数据创建帧
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = Self::tight_len(width, height)?;
    if data.len() != expected {
      return Err(FrameError::BufferTooShort {
        expected,
        actual: data.len(),
      });
    }
    let image = RgbaImage::from_raw(width, height, data).ok_or(FrameError::BufferTooShort {
      expected,
      actual: 0,
    })?;
    Ok(Self { image })
  }

  /// 从带行填充的图像平面拷贝出紧凑的帧
  ///
  /// 屏幕采集得到的平面每行可能带有对齐填充（`row_stride > pixel_stride * width`），
  /// 这里逐行去除填充，最后一行允许不带填充。
  pub fn from_strided(
    data: &[u8],
    width: u32,
    height: u32,
    pixel_stride: usize,
    row_stride: usize,
  ) -> Result<Self, FrameError> {
    let tight = Self::tight_len(width, height)?;
    if pixel_stride != RGBA_CHANNELS {
      return Err(FrameError::UnsupportedPixelStride(pixel_stride));
    }

    let row_bytes = width as usize * RGBA_CHANNELS;
    if row_stride < row_bytes {
      return Err(FrameError::RowStrideTooSmall {
        row_stride,
        required: row_bytes,
      });
    }

    let rows = height as usize;
    let expected = row_stride * (rows - 1) + row_bytes;
    if data.len() < expected {
      return Err(FrameError::BufferTooShort {
        expected,
        actual: data.len(),
      });
    }

    let mut pixels = Vec::with_capacity(tight);
    for row in 0..rows {
      let start = row * row_stride;
      pixels.extend_from_slice(&data[start..start + row_bytes]);
    }

    Self::from_raw(width, height, pixels)
  }

  fn tight_len(width: u32, height: u32) -> Result<usize, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidDimensions { width, height });
    }
    (width as usize)
      .checked_mul(height as usize)
      .and_then(|v| v.checked_mul(RGBA_CHANNELS))
      .ok_or(FrameError::InvalidDimensions { width, height })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  pub fn as_rgba(&self) -> &[u8] {
    self.image.as_raw()
  }

  pub fn as_image(&self) -> &RgbaImage {
    &self.image
  }

  /// 截取帧中的一个矩形区域，区域必须完全位于帧内
  pub fn crop(&self, region: &CropRect) -> Result<RgbaFrame, FrameError> {
    if region.is_empty() || region.x2() > self.width() || region.y2() > self.height() {
      return Err(FrameError::CropOutOfBounds {
        region: *region,
        width: self.width(),
        height: self.height(),
      });
    }

    let image = image::imageops::crop_imm(
      &self.image,
      region.x,
      region.y,
      region.width,
      region.height,
    )
    .to_image();
    Ok(Self { image })
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    image::DynamicImage::ImageRgba8(self.image.clone()).into_rgb8()
  }
}

impl From<RgbaImage> for RgbaFrame {
  fn from(image: RgbaImage) -> Self {
    Self { image }
  }
}

impl From<RgbImage> for RgbaFrame {
  fn from(image: RgbImage) -> Self {
    Self {
      image: image::DynamicImage::ImageRgb8(image).into_rgba8(),
    }
  }
}

impl From<RgbaFrame> for RgbaImage {
  fn from(frame: RgbaFrame) -> Self {
    frame.image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gradient(width: u32, height: u32) -> RgbaFrame {
    RgbaImage::from_fn(width, height, |x, y| image::Rgba([x as u8, y as u8, 0, 255])).into()
  }

  #[test]
  fn strided_plane_drops_row_padding() {
    // 2x2 帧，每行 8 字节像素 + 4 字节填充
    let mut data = Vec::new();
    data.extend_from_slice(&[1, 1, 1, 255, 2, 2, 2, 255, 0xEE, 0xEE, 0xEE, 0xEE]);
    data.extend_from_slice(&[3, 3, 3, 255, 4, 4, 4, 255]);

    let frame = RgbaFrame::from_strided(&data, 2, 2, 4, 12).unwrap();
    assert_eq!(frame.dimensions(), (2, 2));
    assert_eq!(
      frame.as_rgba(),
      &[1, 1, 1, 255, 2, 2, 2, 255, 3, 3, 3, 255, 4, 4, 4, 255]
    );
  }

  #[test]
  fn strided_plane_rejects_bad_layouts() {
    assert_eq!(
      RgbaFrame::from_strided(&[0; 16], 2, 2, 3, 8),
      Err(FrameError::UnsupportedPixelStride(3))
    );
    assert_eq!(
      RgbaFrame::from_strided(&[0; 16], 2, 2, 4, 6),
      Err(FrameError::RowStrideTooSmall {
        row_stride: 6,
        required: 8
      })
    );
    assert_eq!(
      RgbaFrame::from_strided(&[0; 10], 2, 2, 4, 8),
      Err(FrameError::BufferTooShort {
        expected: 16,
        actual: 10
      })
    );
    assert_eq!(
      RgbaFrame::from_strided(&[], 0, 2, 4, 8),
      Err(FrameError::InvalidDimensions {
        width: 0,
        height: 2
      })
    );
  }

  #[test]
  fn crop_copies_the_requested_pixels() {
    let frame = gradient(10, 8);
    let region = CropRect {
      x: 2,
      y: 3,
      width: 4,
      height: 5,
    };
    let cropped = frame.crop(&region).unwrap();
    assert_eq!(cropped.dimensions(), (4, 5));
    assert_eq!(cropped.as_image().get_pixel(0, 0).0, [2, 3, 0, 255]);
    assert_eq!(cropped.as_image().get_pixel(3, 4).0, [5, 7, 0, 255]);
  }

  #[test]
  fn crop_outside_the_frame_is_rejected() {
    let frame = gradient(10, 8);
    let region = CropRect {
      x: 8,
      y: 0,
      width: 4,
      height: 4,
    };
    assert!(matches!(
      frame.crop(&region),
      Err(FrameError::CropOutOfBounds { .. })
    ));
  }
}
