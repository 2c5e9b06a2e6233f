// 该文件是 Shoushi （手势） 项目的一部分。
// src/task.rs - 采集、检测与显示任务
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

use std::{
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError},
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
  capture::{CaptureSession, EVENT_QUEUE_DEPTH},
  frame::RgbaFrame,
  model::{DetectEvent, Detector},
  output::Render,
  present::{PresentConfig, Presenter},
  slot::FrameSlot,
};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一帧，在当前线程内同步完成检测与显示
#[derive(Default, Debug)]
pub struct OneShotTask {
  config: PresentConfig,
}

impl OneShotTask {
  pub fn new(config: PresentConfig) -> Self {
    Self { config }
  }
}

impl<
  E: std::error::Error + Sync + Send + 'static,
  DE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<RgbaFrame, E>>,
  D: Detector<Error = DE>,
  O: Render<Error = RE>,
> Task<I, D, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut detector: D, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功 ({}x{})，开始推理...", frame.width(), frame.height());

    detector.setup()?;
    let slot = FrameSlot::new();
    let frame = Arc::new(frame);
    slot.store(frame.clone());

    let now = Instant::now();
    let result = detector.detect(&frame);
    detector.clear();
    let result = result?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}，检测到 {} 个目标", elapsed, result.len());

    let event = DetectEvent::from_result(result, elapsed, &frame);
    let overlay = Presenter::new(self.config).present(&event, &slot);
    output.render_overlay(&overlay)?;
    info!("渲染完成: {}", overlay.detected_text.replace('\n', ", "));

    Ok(())
  }
}

/// 持续采集任务
///
/// 采集与推理在工作线程上进行，当前线程作为显示线程，
/// 逐条接收检测消息并渲染到输出。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  handle_interrupt: bool,
  config: PresentConfig,
}

impl ContinuousTask {
  pub fn new(config: PresentConfig) -> Self {
    Self {
      config,
      ..Default::default()
    }
  }

  /// 显示指定数量的结果后退出
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理，收到中断后停止采集
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }

  fn install_interrupt(&self) -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let interrupted = Arc::new(AtomicBool::new(false));
    if self.handle_interrupt {
      let flag = interrupted.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        flag.store(true, Ordering::Release);
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }
    Ok(interrupted)
  }
}

impl<
  E: Display + 'static,
  DE: Display + 'static,
  RE: Display,
  I: Iterator<Item = Result<RgbaFrame, E>> + Send + 'static,
  D: Detector<Error = DE> + Send + 'static,
  O: Render<Error = RE>,
> Task<I, D, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupted = self.install_interrupt()?;

    let slot = Arc::new(FrameSlot::new());
    let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
    let mut session = CaptureSession::spawn(input, detector, slot.clone(), tx)?;
    let presenter = Presenter::new(self.config);

    let mut presented = 0u64;
    let mut now = Instant::now();
    loop {
      if interrupted.load(Ordering::Acquire) {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      let event = match rx.recv_timeout(EVENT_POLL_INTERVAL) {
        Ok(event) => event,
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => {
          info!("输入结束，退出任务循环");
          break;
        }
      };

      let overlay = presenter.present(&event, &slot);
      if let Err(e) = output.render_overlay(&overlay) {
        error!("渲染失败，跳过本帧: {}", e);
      }
      presented += 1;
      debug!(
        "显示第 {} 帧: [{}] {}，间隔: {:.2?}",
        presented,
        overlay.detected_text.replace('\n', ", "),
        overlay.inference_text,
        now.elapsed()
      );
      now = Instant::now();

      if self.frame_number.is_some_and(|n| presented >= n) {
        info!("达到指定帧数 {}, 退出任务循环", presented);
        break;
      }
    }

    drop(rx);
    let processed = session.stop();
    info!("任务完成，共推理 {} 帧，显示 {} 帧", processed, presented);
    Ok(())
  }
}

#[cfg(all(test, feature = "model_replay"))]
mod tests {
  use super::*;
  use crate::{
    model::{DetectItem, ReplayDetector},
    present::{MISSING_FRAME_TEXT, NO_DETECTION_TEXT, Overlay, View},
  };
  use std::{convert::Infallible, sync::Mutex};

  #[derive(Default, Clone)]
  struct Collect {
    overlays: Arc<Mutex<Vec<Overlay>>>,
  }

  impl Render for Collect {
    type Error = Infallible;

    fn render_overlay(&self, overlay: &Overlay) -> Result<(), Self::Error> {
      self.overlays.lock().unwrap().push(overlay.clone());
      Ok(())
    }
  }

  fn frames(n: usize, width: u32, height: u32) -> Vec<Result<RgbaFrame, std::io::Error>> {
    (0..n)
      .map(|_| Ok(RgbaFrame::from_raw(width, height, vec![0; (width * height * 4) as usize]).unwrap()))
      .collect()
  }

  fn hand() -> DetectItem {
    DetectItem {
      label: "hand".to_string(),
      score: 0.9,
      bbox: [0.4, 0.4, 0.6, 0.5],
    }
  }

  #[test]
  fn one_shot_zooms_on_the_first_frame() {
    let output = Collect::default();
    let detector = ReplayDetector::with_frames(vec![vec![hand()]], false);
    OneShotTask::default()
      .run_task(frames(2, 1000, 2000).into_iter(), detector, output.clone())
      .unwrap();

    let overlays = output.overlays.lock().unwrap();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].detected_text, "hand");
    match &overlays[0].view {
      View::Zoomed { frame, .. } => assert_eq!(frame.dimensions(), (280, 280)),
      other => panic!("expected zoomed view, got {other:?}"),
    }
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let detector = ReplayDetector::with_frames(vec![], false);
    let result = OneShotTask::default().run_task(
      frames(0, 1, 1).into_iter(),
      detector,
      Collect::default(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn continuous_presents_every_frame_in_order() {
    let output = Collect::default();
    let detector = ReplayDetector::with_frames(vec![vec![hand()], vec![], vec![hand()]], false);
    ContinuousTask::default()
      .run_task(frames(3, 1000, 2000).into_iter(), detector, output.clone())
      .unwrap();

    let overlays = output.overlays.lock().unwrap();
    assert_eq!(overlays.len(), 3);
    assert_eq!(overlays[1].detected_text, NO_DETECTION_TEXT);
    assert_eq!(overlays[1].inference_text, "0ms");
    for overlay in overlays.iter() {
      // 工作线程可能已写入后续帧，但尺寸一致，不会被判为过期
      assert_ne!(overlay.detected_text, MISSING_FRAME_TEXT);
    }
    assert!(overlays[0].selected.is_some());
    assert!(overlays[2].selected.is_some());
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let output = Collect::default();
    let detector = ReplayDetector::with_frames(vec![vec![hand()]], true);
    let frames = std::iter::repeat_with(|| {
      Ok::<_, std::io::Error>(RgbaFrame::from_raw(10, 10, vec![0; 400]).unwrap())
    });
    ContinuousTask::default()
      .with_frame_number(Some(5))
      .run_task(frames, detector, output.clone())
      .unwrap();
    assert_eq!(output.overlays.lock().unwrap().len(), 5);
  }

  #[test]
  fn continuous_fails_when_detector_cannot_start() {
    let url = url::Url::parse("replay:///nonexistent/detections.jsonl").unwrap();
    let detector = <ReplayDetector as crate::FromUrl>::from_url(&url).unwrap();
    let result = ContinuousTask::default().run_task(
      frames(1, 4, 4).into_iter(),
      detector,
      Collect::default(),
    );
    assert!(result.is_err());
  }
}
