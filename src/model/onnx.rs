// 该文件是 Shoushi （手势） 项目的一部分。
// src/model/onnx.rs - ONNX 手势检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 基于 `tract-onnx` 的 YOLO 风格检测模型。
//!
//! URL 形如 `onnx:///path/model.onnx?labels=/path/labels.txt&size=640&confidence=0.3&iou=0.5`。
//! 模型输出形状为 `[1, 4 + 类别数, 锚点数]`，前四个通道为输入像素坐标下的
//! 中心点与宽高。

use std::path::PathBuf;

use image::imageops::FilterType;
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbaFrame,
  model::{DetectItem, DetectResult, Detector},
  query_value,
};

const ONNX_DEFAULT_INPUT_SIZE: u32 = 640;
const ONNX_DEFAULT_CONFIDENCE: f32 = 0.3;
const ONNX_DEFAULT_IOU: f32 = 0.5;
const ONNX_BOX_CHANNELS: usize = 4;

type OnnxPlan = TypedRunnableModel<TypedModel>;

#[derive(Error, Debug)]
pub enum OnnxDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少标签文件参数 labels")]
  MissingLabels,
  #[error("标签文件为空: {0}")]
  EmptyLabels(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error(transparent)]
  TractError(#[from] TractError),
  #[error("模型输出形状不符: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("检测器尚未初始化")]
  NotReady,
}

pub struct OnnxDetector {
  model_path: PathBuf,
  labels_path: PathBuf,
  input_size: u32,
  confidence: f32,
  iou: f32,
  plan: Option<OnnxPlan>,
  labels: Vec<String>,
}

impl FromUrlWithScheme for OnnxDetector {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxDetector {
  type Error = OnnxDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxDetectorError::SchemeMismatch);
    }

    let labels_path = query_value::<String>(url, "labels").ok_or(OnnxDetectorError::MissingLabels)?;

    Ok(OnnxDetector {
      model_path: PathBuf::from(url.path()),
      labels_path: PathBuf::from(labels_path),
      input_size: query_value(url, "size").unwrap_or(ONNX_DEFAULT_INPUT_SIZE),
      confidence: query_value(url, "confidence").unwrap_or(ONNX_DEFAULT_CONFIDENCE),
      iou: query_value(url, "iou").unwrap_or(ONNX_DEFAULT_IOU),
      plan: None,
      labels: Vec::new(),
    })
  }
}

impl OnnxDetector {
  fn build_input(&self, frame: &RgbaFrame) -> Tensor {
    let size = self.input_size;
    let resized = image::imageops::resize(&frame.to_rgb_image(), size, size, FilterType::Triangle);
    let side = size as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
      resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
    .into_tensor()
  }
}

impl Detector for OnnxDetector {
  type Error = OnnxDetectorError;

  fn setup(&mut self) -> Result<(), Self::Error> {
    info!("加载标签文件: {}", self.labels_path.display());
    let labels = parse_labels(&std::fs::read_to_string(&self.labels_path)?);
    if labels.is_empty() {
      return Err(OnnxDetectorError::EmptyLabels(
        self.labels_path.display().to_string(),
      ));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let side = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)?
      .with_input_fact(0, f32::fact([1, 3, side, side]).into())?
      .into_optimized()?
      .into_runnable()?;
    info!("模型加载完成，共 {} 个类别", labels.len());

    self.labels = labels;
    self.plan = Some(plan);
    Ok(())
  }

  fn detect(&mut self, frame: &RgbaFrame) -> Result<DetectResult, Self::Error> {
    let plan = self.plan.as_ref().ok_or(OnnxDetectorError::NotReady)?;

    let input = self.build_input(frame);
    let outputs = plan.run(tvec!(input.into()))?;
    let output = outputs[0].to_array_view::<f32>()?;
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] != ONNX_BOX_CHANNELS + self.labels.len() {
      return Err(OnnxDetectorError::OutputShape(shape));
    }

    let data: Vec<f32> = output.iter().copied().collect();
    let candidates = decode_output(
      &data,
      self.labels.len(),
      shape[2],
      self.input_size as f32,
      self.confidence,
    );
    debug!("置信度过滤后剩余 {} 个候选框", candidates.len());

    let items = non_max_suppression(candidates, self.iou)
      .into_iter()
      .map(|c| DetectItem {
        label: self.labels[c.class_id].clone(),
        score: c.score,
        bbox: c.bbox,
      })
      .collect::<Vec<_>>();
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::from(items))
  }

  fn clear(&mut self) {
    self.plan = None;
    self.labels.clear();
    info!("ONNX 模型资源已释放");
  }
}

fn parse_labels(content: &str) -> Vec<String> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
  class_id: usize,
  score: f32,
  bbox: [f32; 4],
}

/// 解码 `[4 + 类别数, 锚点数]` 的通道优先输出，坐标归一化到 [0, 1]
fn decode_output(
  data: &[f32],
  num_classes: usize,
  anchors: usize,
  input_size: f32,
  threshold: f32,
) -> Vec<Candidate> {
  let mut candidates = Vec::new();

  for a in 0..anchors {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c, data[(ONNX_BOX_CHANNELS + c) * anchors + a]))
      .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score < threshold {
      continue;
    }

    let cx = data[a];
    let cy = data[anchors + a];
    let w = data[2 * anchors + a];
    let h = data[3 * anchors + a];

    let bbox = [
      ((cx - w / 2.0) / input_size).clamp(0.0, 1.0),
      ((cy - h / 2.0) / input_size).clamp(0.0, 1.0),
      ((cx + w / 2.0) / input_size).clamp(0.0, 1.0),
      ((cy + h / 2.0) / input_size).clamp(0.0, 1.0),
    ];

    candidates.push(Candidate {
      class_id,
      score,
      bbox,
    });
  }

  candidates
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = w * h;
  let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别的贪心非极大值抑制，结果按置信度从高到低排列
fn non_max_suppression(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    let overlapped = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > threshold);
    if !overlapped {
      kept.push(candidate);
    }
  }
  kept
}
