// 该文件是 Shoushi （手势） 项目的一部分。
// src/present.rs - 检测结果到叠加窗口内容的换算
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

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
  crop::{CropRect, DEFAULT_PADDING, crop_region},
  frame::RgbaFrame,
  model::{DetectEvent, DetectItem},
  select::{AllowList, select_region, summarize_labels},
  slot::FrameSlot,
};

pub const NO_DETECTION_TEXT: &str = "未检测到手语。";
pub const MISSING_FRAME_TEXT: &str = "错误：缺少用于裁剪的帧。";

#[derive(Debug, Clone)]
pub struct PresentConfig {
  pub allow_list: AllowList,
  pub padding: f32,
}

impl Default for PresentConfig {
  fn default() -> Self {
    Self {
      allow_list: AllowList::default(),
      padding: DEFAULT_PADDING,
    }
  }
}

/// 叠加窗口中显示的图像
#[derive(Debug, Clone)]
pub enum View {
  /// 没有可显示的帧
  Cleared,
  /// 整帧原样显示
  Full(Arc<RgbaFrame>),
  /// 放大显示选中区域
  Zoomed {
    frame: RgbaFrame,
    region: CropRect,
    source: Arc<RgbaFrame>,
  },
}

impl View {
  /// 实际显示的图像
  pub fn image(&self) -> Option<&RgbaFrame> {
    match self {
      View::Cleared => None,
      View::Full(frame) => Some(frame.as_ref()),
      View::Zoomed { frame, .. } => Some(frame),
    }
  }

  /// 检测所对应的原始帧
  pub fn source(&self) -> Option<&RgbaFrame> {
    match self {
      View::Cleared => None,
      View::Full(frame) => Some(frame.as_ref()),
      View::Zoomed { source, .. } => Some(source.as_ref()),
    }
  }

  /// 显示内容在原始帧中的位置
  pub fn region(&self) -> Option<CropRect> {
    match self {
      View::Cleared => None,
      View::Full(frame) => Some(CropRect::full(frame.width(), frame.height())),
      View::Zoomed { region, .. } => Some(*region),
    }
  }
}

/// 一次检测对应的叠加窗口内容
#[derive(Debug, Clone)]
pub struct Overlay {
  pub detected_text: String,
  pub inference_text: String,
  pub view: View,
  pub items: Box<[DetectItem]>,
  pub selected: Option<DetectItem>,
}

impl Overlay {
  pub fn has_detections(&self) -> bool {
    !self.items.is_empty()
  }
}

/// 显示线程上的结果处理
#[derive(Debug, Clone, Default)]
pub struct Presenter {
  config: PresentConfig,
}

impl Presenter {
  pub fn new(config: PresentConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PresentConfig {
    &self.config
  }

  pub fn present(&self, event: &DetectEvent, slot: &FrameSlot<RgbaFrame>) -> Overlay {
    match event {
      DetectEvent::Empty => Overlay {
        detected_text: NO_DETECTION_TEXT.to_string(),
        inference_text: "0ms".to_string(),
        view: slot.load().map(View::Full).unwrap_or(View::Cleared),
        items: Box::default(),
        selected: None,
      },
      DetectEvent::Detected {
        items,
        inference_time,
        frame_width,
        frame_height,
      } => {
        let inference_text = format!("{}ms", inference_time.as_millis());

        let frame = match slot.load() {
          Some(frame) if frame.dimensions() == (*frame_width, *frame_height) => frame,
          Some(frame) => {
            warn!(
              "最新帧尺寸 {}x{} 与检测结果 {}x{} 不一致，无法裁剪",
              frame.width(),
              frame.height(),
              frame_width,
              frame_height
            );
            return Self::missing_frame(inference_text, items);
          }
          None => {
            warn!("最新帧为空，无法裁剪");
            return Self::missing_frame(inference_text, items);
          }
        };

        if items.is_empty() {
          return Overlay {
            detected_text: NO_DETECTION_TEXT.to_string(),
            inference_text,
            view: View::Full(frame),
            items: items.clone(),
            selected: None,
          };
        }

        let selected = select_region(items, &self.config.allow_list).cloned();
        let view = match &selected {
          Some(item) => self.zoom(frame, item),
          None => View::Full(frame),
        };

        Overlay {
          detected_text: summarize_labels(items),
          inference_text,
          view,
          items: items.clone(),
          selected,
        }
      }
    }
  }

  fn zoom(&self, frame: Arc<RgbaFrame>, item: &DetectItem) -> View {
    let region = match crop_region(
      &item.bbox,
      frame.width(),
      frame.height(),
      self.config.padding,
    ) {
      Ok(region) => region,
      Err(e) => {
        warn!("{}，显示整帧", e);
        return View::Full(frame);
      }
    };

    match frame.crop(&region) {
      Ok(zoomed) => {
        debug!("放大区域: {:?}", region);
        View::Zoomed {
          frame: zoomed,
          region,
          source: frame,
        }
      }
      Err(e) => {
        error!("裁剪放大区域失败: {}", e);
        View::Full(frame)
      }
    }
  }

  fn missing_frame(inference_text: String, items: &[DetectItem]) -> Overlay {
    Overlay {
      detected_text: MISSING_FRAME_TEXT.to_string(),
      inference_text,
      view: View::Cleared,
      items: items.into(),
      selected: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::draw::Draw;
  use std::time::Duration;

  fn slot_with(width: u32, height: u32) -> FrameSlot<RgbaFrame> {
    let slot = FrameSlot::new();
    let data = vec![7u8; (width * height * 4) as usize];
    slot.store(Arc::new(RgbaFrame::from_raw(width, height, data).unwrap()));
    slot
  }

  fn item(label: &str, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      label: label.to_string(),
      score,
      bbox,
    }
  }

  fn detected(items: Vec<DetectItem>, width: u32, height: u32) -> DetectEvent {
    DetectEvent::Detected {
      items: items.into_boxed_slice(),
      inference_time: Duration::from_millis(42),
      frame_width: width,
      frame_height: height,
    }
  }

  #[test]
  fn empty_event_shows_full_frame() {
    let slot = slot_with(10, 20);
    let overlay = Presenter::default().present(&DetectEvent::Empty, &slot);
    assert_eq!(overlay.detected_text, NO_DETECTION_TEXT);
    assert_eq!(overlay.inference_text, "0ms");
    assert!(matches!(overlay.view, View::Full(_)));

    let overlay = Presenter::default().present(&DetectEvent::Empty, &FrameSlot::new());
    assert!(matches!(overlay.view, View::Cleared));
  }

  #[test]
  fn allow_listed_detection_is_zoomed() {
    let slot = slot_with(1000, 2000);
    let event = detected(
      vec![
        item("car", 0.99, [0.0, 0.0, 0.1, 0.1]),
        item("hand", 0.9, [0.4, 0.4, 0.6, 0.5]),
      ],
      1000,
      2000,
    );
    let overlay = Presenter::default().present(&event, &slot);

    assert_eq!(overlay.detected_text, "car\nhand");
    assert_eq!(overlay.inference_text, "42ms");
    assert_eq!(overlay.selected.as_ref().map(|s| s.label.as_str()), Some("hand"));
    match &overlay.view {
      View::Zoomed { frame, region, .. } => {
        assert_eq!(frame.dimensions(), (280, 280));
        assert_eq!(
          *region,
          CropRect {
            x: 360,
            y: 760,
            width: 280,
            height: 280
          }
        );
      }
      other => panic!("expected zoomed view, got {other:?}"),
    }
  }

  #[test]
  fn no_allow_listed_detection_shows_frame_unmodified() {
    let slot = slot_with(64, 48);
    let event = detected(vec![item("car", 0.99, [0.1, 0.1, 0.5, 0.5])], 64, 48);
    let overlay = Presenter::default().present(&event, &slot);

    assert_eq!(overlay.detected_text, "car");
    assert!(overlay.selected.is_none());
    match &overlay.view {
      View::Full(frame) => assert!(Arc::ptr_eq(frame, &slot.load().unwrap())),
      other => panic!("expected full view, got {other:?}"),
    }
  }

  #[test]
  fn degenerate_crop_falls_back_to_full_frame() {
    let slot = slot_with(64, 48);
    let event = detected(vec![item("hand", 0.9, [0.5, 0.5, 0.5, 0.5])], 64, 48);
    let overlay = Presenter::default().present(&event, &slot);
    assert!(overlay.selected.is_some());
    assert!(matches!(overlay.view, View::Full(_)));
  }

  #[test]
  fn missing_or_stale_frame_clears_the_view() {
    let event = detected(vec![item("hand", 0.9, [0.4, 0.4, 0.6, 0.6])], 64, 48);

    let overlay = Presenter::default().present(&event, &FrameSlot::new());
    assert_eq!(overlay.detected_text, MISSING_FRAME_TEXT);
    assert_eq!(overlay.inference_text, "42ms");
    assert!(matches!(overlay.view, View::Cleared));

    let overlay = Presenter::default().present(&event, &slot_with(32, 32));
    assert_eq!(overlay.detected_text, MISSING_FRAME_TEXT);
    assert!(matches!(overlay.view, View::Cleared));
  }

  #[test]
  fn custom_allow_list_changes_the_selection() {
    let slot = slot_with(100, 100);
    let event = detected(
      vec![
        item("hand", 0.9, [0.1, 0.1, 0.2, 0.2]),
        item("thanks", 0.4, [0.25, 0.25, 0.75, 0.75]),
      ],
      100,
      100,
    );
    let presenter = Presenter::new(PresentConfig {
      allow_list: AllowList::new(["thanks"]),
      padding: 0.0,
    });
    let overlay = presenter.present(&event, &slot);
    assert_eq!(overlay.selected.map(|s| s.label), Some("thanks".to_string()));
    assert_eq!(
      overlay.view.region(),
      Some(CropRect {
        x: 25,
        y: 25,
        width: 50,
        height: 50
      })
    );
  }

  #[test]
  fn out_of_range_detection_is_zoomed_inside_the_frame() {
    let slot = slot_with(100, 100);
    let event = detected(vec![item("hand", 0.9, [-1.0, 0.2, 5.0, 0.4])], 100, 100);
    let overlay = Presenter::default().present(&event, &slot);

    assert_eq!(overlay.detected_text, "hand");
    assert_eq!(overlay.view.region(), Some(CropRect::full(100, 100)));
    assert!(matches!(overlay.view, View::Zoomed { .. }));

    let image = Draw::default().draw_overlay(&overlay).unwrap();
    assert_eq!(image.dimensions(), (100, 100));
  }

  #[test]
  fn non_finite_detection_falls_back_to_full_frame() {
    let slot = slot_with(64, 48);
    for bbox in [
      [f32::NAN; 4],
      [f32::INFINITY; 4],
      [f32::NEG_INFINITY; 4],
    ] {
      let event = detected(vec![item("hand", 0.9, bbox)], 64, 48);
      let overlay = Presenter::default().present(&event, &slot);
      assert!(overlay.selected.is_some());
      assert!(matches!(overlay.view, View::Full(_)), "{bbox:?}");

      let image = Draw::default().draw_overlay(&overlay).unwrap();
      assert_eq!(image.dimensions(), (64, 48));
    }
  }

  #[test]
  fn unusable_padding_still_zooms_inside_the_frame() {
    let slot = slot_with(100, 100);
    let event = detected(vec![item("hand", 0.9, [0.25, 0.25, 0.5, 0.5])], 100, 100);
    for padding in [f32::NAN, f32::INFINITY, -3.0, 1e30] {
      let presenter = Presenter::new(PresentConfig {
        padding,
        ..Default::default()
      });
      let overlay = presenter.present(&event, &slot);
      let region = overlay.view.region().unwrap();
      assert!(region.x2() <= 100 && region.y2() <= 100, "{padding}: {region:?}");
      assert!(matches!(overlay.view, View::Zoomed { .. }), "{padding}");
    }
  }
}
