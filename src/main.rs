// 该文件是 Shoushi （手势） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shoushi::{
  FromUrl,
  input::InputWrapper,
  model::DetectorWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("帧来源: {}", args.input);
  info!("检测器: {}", args.model);
  info!("输出: {}", args.output);
  info!(
    "放大类别: {}，扩展比例: {}",
    args.allow.labels().join(","),
    args.padding
  );

  let detector = DetectorWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let input = InputWrapper::from_url(&args.input)?;

  ContinuousTask::new(args.present_config())
    .with_frame_number(args.frame_number)
    .with_interrupt(true)
    .run_task(input, detector, output)?;

  Ok(())
}
