// 该文件是 Shoushi （手势） 项目的一部分。
// src/output/draw.rs - 叠加窗口内容绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  crop::{CropRect, unit},
  model::DetectItem,
  present::Overlay,
  query_value,
};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const SELECTED_COLOR: [u8; 3] = [255, 64, 0]; // 橙色
const BOX_THICKNESS: u32 = 2;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色
const CAPTION_BACKGROUND: [u8; 3] = [32, 32, 32]; // 深灰

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {path}: {source}")]
  FontIoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
}

pub struct Draw {
  box_color: [u8; 3],
  selected_color: [u8; 3],
  thickness: u32,
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      selected_color: SELECTED_COLOR,
      thickness: BOX_THICKNESS,
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }
}

impl Draw {
  /// 按输出 URL 的 `?font=/path/to/font.ttf` 加载字体，未指定时不绘制文字
  pub fn from_url(url: &Url) -> Result<Self, DrawError> {
    match query_value::<PathBuf>(url, "font") {
      Some(path) => Draw::default().with_font(&path),
      None => Ok(Draw::default()),
    }
  }

  pub fn with_font(self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path).map_err(|source| DrawError::FontIoError {
      path: path.to_path_buf(),
      source,
    })?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.to_path_buf()))?;
    info!("加载字体: {}", path.display());

    Ok(Self {
      font: Some(font),
      ..self
    })
  }

  /// 绘制叠加窗口当前显示的图像、检测框与文字
  ///
  /// 视图为空时返回 `None`。
  pub fn draw_overlay(&self, overlay: &Overlay) -> Option<RgbImage> {
    let mut image = self.draw_view(overlay)?;
    self.draw_captions(&mut image, overlay);
    Some(image)
  }

  /// 绘制当前显示的图像，并把检测框投影到显示区域内
  ///
  /// 加载了字体时每个框上方标注类别与置信度。
  pub fn draw_view(&self, overlay: &Overlay) -> Option<RgbImage> {
    let shown = overlay.view.image()?;
    let source = overlay.view.source()?;
    let region = overlay.view.region()?;
    let mut image = shown.to_rgb_image();

    for item in overlay.items.iter() {
      let color = if overlay.selected.as_ref() == Some(item) {
        self.selected_color
      } else {
        self.box_color
      };
      if let Some(rect) = project_bbox(&item.bbox, source.width(), source.height(), &region) {
        self.draw_box(&mut image, rect, color);
        self.draw_label(&mut image, rect, color, item);
      }
    }

    Some(image)
  }

  /// 在左上角绘制检测摘要与推理耗时，未加载字体时不做任何事
  pub fn draw_captions(&self, image: &mut RgbImage, overlay: &Overlay) {
    let lines = overlay
      .detected_text
      .lines()
      .chain(std::iter::once(overlay.inference_text.as_str()))
      .filter(|line| !line.is_empty());

    for (row, line) in lines.enumerate() {
      let y = row as i32 * LABEL_TEXT_HEIGHT;
      self.draw_text_block(image, 0, y, line, CAPTION_BACKGROUND);
    }
  }

  fn draw_box(&self, image: &mut RgbImage, rect: Rect, color: [u8; 3]) {
    for t in 0..self.thickness {
      let width = rect.width().saturating_sub(2 * t);
      let height = rect.height().saturating_sub(2 * t);
      if width == 0 || height == 0 {
        break;
      }
      let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32).of_size(width, height);
      draw_hollow_rect_mut(image, inner, Rgb(color));
    }
  }

  fn draw_label(&self, image: &mut RgbImage, rect: Rect, color: [u8; 3], item: &DetectItem) {
    let label = format!("{} {:.2}", item.label, item.score);
    // 标签放在框上方，贴顶时压在框内
    let y = (rect.top() - LABEL_TEXT_HEIGHT).max(0);
    self.draw_text_block(image, rect.left(), y, &label, color);
  }

  fn draw_text_block(
    &self,
    image: &mut RgbImage,
    x: i32,
    y: i32,
    text: &str,
    background: [u8; 3],
  ) {
    let Some(font) = &self.font else {
      return;
    };
    if x < 0 || y < 0 || x as u32 >= image.width() || y as u32 >= image.height() {
      return;
    }

    let text_width = (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as u32;
    let width = text_width.min(image.width() - x as u32);
    let height = (LABEL_TEXT_HEIGHT as u32).min(image.height() - y as u32);
    if width == 0 || height == 0 {
      return;
    }

    draw_filled_rect_mut(image, Rect::at(x, y).of_size(width, height), Rgb(background));
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      x,
      y + LABEL_TEXT_VERTICAL_PADDING,
      self.font_scale,
      font,
      text,
    );
  }
}

/// 把归一化检测框投影到显示区域坐标系，并裁去区域外的部分
///
/// 坐标先截到 `[0, 1]`（NaN 视为 0）。与显示区域不相交时返回 `None`。
pub fn project_bbox(
  bbox: &[f32; 4],
  source_width: u32,
  source_height: u32,
  region: &CropRect,
) -> Option<Rect> {
  let (w, h) = (source_width as f32, source_height as f32);
  let (rx, ry) = (region.x as i64, region.y as i64);

  let x_min = ((unit(bbox[0]) * w).floor() as i64).saturating_sub(rx).max(0);
  let y_min = ((unit(bbox[1]) * h).floor() as i64).saturating_sub(ry).max(0);
  let x_max = ((unit(bbox[2]) * w).ceil() as i64)
    .saturating_sub(rx)
    .min(region.width as i64);
  let y_max = ((unit(bbox[3]) * h).ceil() as i64)
    .saturating_sub(ry)
    .min(region.height as i64);

  if x_min >= x_max || y_min >= y_max {
    return None;
  }

  Some(
    Rect::at(x_min as i32, y_min as i32).of_size((x_max - x_min) as u32, (y_max - y_min) as u32),
  )
}

/// 等比缩放到固定尺寸，空白处填充黑色
pub fn fit_into(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  let mut canvas = RgbImage::new(width, height);
  if image.width() == 0 || image.height() == 0 {
    return canvas;
  }

  let scale = (width as f32 / image.width() as f32).min(height as f32 / image.height() as f32);
  let scaled_w = ((image.width() as f32 * scale).round() as u32).clamp(1, width);
  let scaled_h = ((image.height() as f32 * scale).round() as u32).clamp(1, height);
  let scaled = image::imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

  let x = (width - scaled_w) / 2;
  let y = (height - scaled_h) / 2;
  image::imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
  canvas
}

/// 以文本形式记录检测结果
pub struct Record {
  pub with_inference_time: bool,
}

impl Record {
  pub fn format(&self, overlay: &Overlay) -> String {
    let mut records = Vec::new();
    if self.with_inference_time {
      records.push(format!("# {}", overlay.inference_text));
    }
    for DetectItem { label, score, bbox } in overlay.items.iter() {
      records.push(format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        label, score, bbox[0], bbox[1], bbox[2], bbox[3]
      ));
    }
    records.join("\n")
  }

  pub fn record(&self, overlay: &Overlay, path: &std::path::Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(overlay))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::RgbaFrame, present::View};
  use std::sync::Arc;

  fn item(label: &str, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      label: label.to_string(),
      score: 0.5,
      bbox,
    }
  }

  #[test]
  fn boxes_are_projected_into_the_crop() {
    let region = CropRect {
      x: 20,
      y: 10,
      width: 50,
      height: 50,
    };
    let rect = project_bbox(&[0.25, 0.25, 0.5, 0.5], 100, 100, &region).unwrap();
    assert_eq!((rect.left(), rect.top()), (5, 15));
    assert_eq!((rect.width(), rect.height()), (25, 25));

    // 部分在区域外的框被裁剪
    let rect = project_bbox(&[0.0, 0.0, 0.25, 0.25], 100, 100, &region).unwrap();
    assert_eq!((rect.left(), rect.top()), (0, 0));
    assert_eq!((rect.width(), rect.height()), (5, 15));

    assert!(project_bbox(&[0.8, 0.8, 0.9, 0.9], 100, 100, &region).is_none());
  }

  #[test]
  fn out_of_range_boxes_are_clamped_before_projection() {
    let region = CropRect {
      x: 5,
      y: 5,
      width: 10,
      height: 10,
    };
    let rect = project_bbox(&[f32::NEG_INFINITY, 0.0, 0.5, 0.5], 100, 100, &region).unwrap();
    assert_eq!((rect.left(), rect.top()), (0, 0));
    assert_eq!((rect.width(), rect.height()), (10, 10));

    let rect = project_bbox(&[-1.0, -1.0, 1e20, f32::INFINITY], 100, 100, &region).unwrap();
    assert_eq!((rect.width(), rect.height()), (10, 10));

    assert!(project_bbox(&[f32::NAN; 4], 100, 100, &region).is_none());
    assert!(project_bbox(&[f32::MAX; 4], 100, 100, &region).is_none());
  }

  #[test]
  fn non_finite_boxes_do_not_break_drawing() {
    let source = Arc::new(RgbaFrame::from_raw(40, 40, vec![0; 40 * 40 * 4]).unwrap());
    let overlay = Overlay {
      detected_text: "hand".to_string(),
      inference_text: "3ms".to_string(),
      view: View::Full(source),
      items: vec![
        item("hand", [f32::NEG_INFINITY, 0.0, f32::INFINITY, 0.25]),
        item("hand", [f32::NAN; 4]),
      ]
      .into_boxed_slice(),
      selected: None,
    };

    let image = Draw::default().draw_overlay(&overlay).unwrap();
    assert_eq!(image.get_pixel(0, 0).0, BOX_COLOR);
    assert_eq!(image.get_pixel(39, 0).0, BOX_COLOR);
    assert_eq!(image.get_pixel(20, 30).0, [0, 0, 0]);
  }

  #[test]
  fn font_query_is_optional_but_must_load() {
    let plain = Draw::from_url(&Url::parse("image:///tmp/out.png").unwrap()).unwrap();
    assert!(plain.font.is_none());

    let missing = Url::parse("image:///tmp/out.png?font=/nonexistent/font.ttf").unwrap();
    assert!(matches!(
      Draw::from_url(&missing),
      Err(DrawError::FontIoError { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let junk = dir.path().join("junk.ttf");
    std::fs::write(&junk, b"not a font").unwrap();
    assert!(matches!(
      Draw::default().with_font(&junk),
      Err(DrawError::InvalidFont(_))
    ));
  }

  #[test]
  fn captions_and_labels_need_a_font() {
    let source = Arc::new(RgbaFrame::from_raw(200, 100, vec![0; 200 * 100 * 4]).unwrap());
    let selected = item("hand", [0.5, 0.5, 0.875, 0.875]);
    let overlay = Overlay {
      detected_text: "hand".to_string(),
      inference_text: "12ms".to_string(),
      view: View::Full(source),
      items: vec![selected.clone()].into_boxed_slice(),
      selected: Some(selected),
    };

    let plain = Draw::default().draw_overlay(&overlay).unwrap();
    assert_eq!(plain.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(plain.get_pixel(100, 26).0, [0, 0, 0]);

    // 系统未安装该字体时跳过
    let font = Path::new("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf");
    if !font.exists() {
      return;
    }
    let image = Draw::default()
      .with_font(font)
      .unwrap()
      .draw_overlay(&overlay)
      .unwrap();

    // 摘要与耗时两行叠在左上角
    assert_eq!(image.get_pixel(0, 0).0, CAPTION_BACKGROUND);
    assert_eq!(image.get_pixel(0, 24).0, CAPTION_BACKGROUND);
    assert_eq!(image.get_pixel(0, 48).0, [0, 0, 0]);

    // 框上方的标签底色与框同色，并写有文字
    assert_eq!(image.get_pixel(100, 26).0, SELECTED_COLOR);
    let label_has_text = (100..190)
      .flat_map(|x| (28..48).map(move |y| (x, y)))
      .any(|(x, y)| image.get_pixel(x, y).0 != SELECTED_COLOR);
    assert!(label_has_text);
  }

  #[test]
  fn selected_box_uses_its_own_color() {
    let source = Arc::new(RgbaFrame::from_raw(40, 40, vec![0; 40 * 40 * 4]).unwrap());
    let selected = item("hand", [0.5, 0.5, 1.0, 1.0]);
    let overlay = Overlay {
      detected_text: "car\nhand".to_string(),
      inference_text: "3ms".to_string(),
      view: View::Full(source),
      items: vec![item("car", [0.0, 0.0, 0.25, 0.25]), selected.clone()].into_boxed_slice(),
      selected: Some(selected),
    };

    let image = Draw::default().draw_overlay(&overlay).unwrap();
    assert_eq!(image.dimensions(), (40, 40));
    assert_eq!(image.get_pixel(0, 0).0, BOX_COLOR);
    assert_eq!(image.get_pixel(20, 20).0, SELECTED_COLOR);
    assert_eq!(image.get_pixel(30, 30).0, [0, 0, 0]);
  }

  #[test]
  fn cleared_view_draws_nothing() {
    let overlay = Overlay {
      detected_text: String::new(),
      inference_text: "0ms".to_string(),
      view: View::Cleared,
      items: Box::default(),
      selected: None,
    };
    assert!(Draw::default().draw_overlay(&overlay).is_none());
  }

  #[test]
  fn fit_into_letterboxes() {
    let image = RgbImage::from_pixel(100, 50, Rgb([255, 255, 255]));
    let fitted = fit_into(&image, 60, 60);
    assert_eq!(fitted.dimensions(), (60, 60));
    assert_eq!(fitted.get_pixel(30, 2).0, [0, 0, 0]);
    assert_eq!(fitted.get_pixel(30, 30).0, [255, 255, 255]);
  }

  #[test]
  fn record_lists_every_item() {
    let overlay = Overlay {
      detected_text: "hand".to_string(),
      inference_text: "12ms".to_string(),
      view: View::Cleared,
      items: vec![item("hand", [0.1, 0.2, 0.3, 0.4])].into_boxed_slice(),
      selected: None,
    };
    let text = Record {
      with_inference_time: true,
    }
    .format(&overlay);
    assert_eq!(text, "# 12ms\nhand, 0.5000, 0.1000, 0.2000, 0.3000, 0.4000");
  }
}
