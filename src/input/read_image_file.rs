// 该文件是 Shoushi （手势） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与图像目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame, query_value};

use image::{ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误 {path}: {source}")]
  ImageLoadError {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("目录中没有图像文件: {0}")]
  EmptyFolder(PathBuf),
}

fn load_image(path: &Path) -> Result<RgbaImage, ImageFileInputError> {
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()
    .map_err(|source| ImageFileInputError::ImageLoadError {
      path: path.to_path_buf(),
      source,
    })?;
  Ok(image.into_rgba8())
}

/// 单张图像，按 `?repeat=N` 重复产出 N 次（默认 1 次）
pub struct ImageFileInput {
  image: Arc<RgbaImage>,
  remaining: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let image = load_image(Path::new(url.path()))?;
    let remaining = query_value(url, "repeat").unwrap_or(1);
    info!(
      "读取图像 {} ({}x{})，重复 {} 次",
      url.path(),
      image.width(),
      image.height(),
      remaining
    );

    Ok(ImageFileInput {
      image: Arc::new(image),
      remaining,
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<RgbaFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(Ok(RgbaFrame::from(self.image.as_ref().clone())))
  }
}

/// 目录下的全部图像，按文件名排序依次产出
///
/// 单个文件解码失败时产出对应的错误，后续文件照常读取。
pub struct ImageFolderInput {
  files: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let directory = PathBuf::from(url.path());
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    if files.is_empty() {
      return Err(ImageFileInputError::EmptyFolder(directory));
    }
    files.sort();
    info!("从目录 {} 读取 {} 张图像", directory.display(), files.len());

    Ok(ImageFolderInput {
      files: files.into_iter(),
    })
  }
}

impl Iterator for ImageFolderInput {
  type Item = Result<RgbaFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    debug!("读取图像: {}", path.display());
    Some(load_image(&path).map(RgbaFrame::from))
  }
}
