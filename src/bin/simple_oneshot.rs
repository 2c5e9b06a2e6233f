// 该文件是 Shoushi （手势） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧检测测试代码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shoushi::{
  FromUrl,
  input::InputWrapper,
  model::DetectorWrapper,
  output::OutputWrapper,
  present::PresentConfig,
  select::AllowList,
  task::{OneShotTask, Task},
};

/// 对第一帧做一次检测并输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 帧来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 可放大显示的类别
  #[arg(long, value_name = "LABELS", default_value = "hand,person")]
  pub allow: AllowList,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.model);
  info!("帧来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let config = PresentConfig {
    allow_list: args.allow,
    ..Default::default()
  };
  OneShotTask::new(config).run_task(input, detector, output)?;

  Ok(())
}
