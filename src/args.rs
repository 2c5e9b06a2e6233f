// 该文件是 Shoushi （手势） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::Parser;
use url::Url;

use shoushi::{crop::DEFAULT_PADDING, present::PresentConfig, select::AllowList};

/// 手语检测屏幕采集
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 帧来源
  /// - 屏幕: gst://screen?display=:0&fps=10
  /// - 摄像头: gst://camera/dev/video0?width=640&height=480
  /// - 视频: gst://file/path/to/video.mp4
  /// - 图片: image:///path/to/frame.png?repeat=10
  /// - 图片目录: folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 检测器
  /// - 回放: replay:///path/to/detections.jsonl?loop
  /// - ONNX: onnx:///path/to/model.onnx?labels=/path/to/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输出
  /// - 日志: log://
  /// - 悬浮窗口: gst://window?width=480&height=480
  /// - 视频文件: gst://file/path/to/out.mp4
  /// - 图片: image:///path/to/out.png
  /// - 按日期记录: folder:///path/to/records?always
  /// - 图像类输出可加 `font=/path/to/font.ttf` 绘制标签与文字
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 可放大显示的类别，逗号分隔，忽略大小写
  #[arg(long, value_name = "LABELS", default_value = "hand,person")]
  pub allow: AllowList,

  /// 放大区域相对检测框的扩展比例
  #[arg(long, value_name = "RATIO", default_value_t = DEFAULT_PADDING)]
  pub padding: f32,

  /// 显示指定帧数后退出，不指定则持续运行直到输入结束或收到中断
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<u64>,
}

impl Args {
  pub fn present_config(&self) -> PresentConfig {
    PresentConfig {
      allow_list: self.allow.clone(),
      padding: self.padding,
    }
  }
}
