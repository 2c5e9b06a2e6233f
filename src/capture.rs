// 该文件是 Shoushi （手势） 项目的一部分。
// src/capture.rs - 采集与推理工作线程
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
    mpsc::{SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::RgbaFrame,
  model::{DetectEvent, Detector},
  slot::FrameSlot,
};

const CAPTURE_THREAD_NAME: &str = "shoushi-capture";
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// 结果通道容量，显示端落后时工作线程最多领先一帧
pub const EVENT_QUEUE_DEPTH: usize = 1;

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("检测器初始化失败: {0}")]
  DetectorSetup(String),
  #[error("无法启动采集线程: {0}")]
  Spawn(#[from] std::io::Error),
}

/// 一次采集会话
///
/// 工作线程每次只处理一帧：写入最新帧单槽、推理、把结果发往显示线程，
/// 处理完成后才拉取下一帧。结果通道应以 [`EVENT_QUEUE_DEPTH`] 创建，
/// 显示端未取走上一条结果时工作线程等待，不会积压过期结果。
/// 停止时等待工作线程退出，并释放最后一帧。
pub struct CaptureSession {
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<u64>>,
  slot: Arc<FrameSlot<RgbaFrame>>,
}

impl CaptureSession {
  pub fn spawn<I, E, D>(
    frames: I,
    mut detector: D,
    slot: Arc<FrameSlot<RgbaFrame>>,
    events: SyncSender<DetectEvent>,
  ) -> Result<Self, CaptureError>
  where
    I: Iterator<Item = Result<RgbaFrame, E>> + Send + 'static,
    E: Display,
    D: Detector + Send + 'static,
    D::Error: Display,
  {
    info!("初始化检测器...");
    detector
      .setup()
      .map_err(|e| CaptureError::DetectorSetup(e.to_string()))?;
    info!("检测器初始化完成");

    let stop = Arc::new(AtomicBool::new(false));
    let handle = {
      let stop = stop.clone();
      let slot = slot.clone();
      thread::Builder::new()
        .name(CAPTURE_THREAD_NAME.to_string())
        .spawn(move || capture_loop(frames, detector, &slot, &events, &stop))?
    };

    Ok(CaptureSession {
      stop,
      handle: Some(handle),
      slot,
    })
  }

  pub fn is_running(&self) -> bool {
    self
      .handle
      .as_ref()
      .map(|h| !h.is_finished())
      .unwrap_or(false)
  }

  /// 停止采集，返回工作线程处理过的帧数
  pub fn stop(&mut self) -> u64 {
    self.stop.store(true, Ordering::Release);
    let processed = match self.handle.take() {
      Some(handle) => handle.join().unwrap_or_else(|_| {
        error!("采集线程异常退出");
        0
      }),
      None => 0,
    };

    if self.slot.take().is_some() {
      debug!("已释放最后一帧");
    }
    processed
  }
}

impl Drop for CaptureSession {
  fn drop(&mut self) {
    if self.handle.is_some() {
      let processed = self.stop();
      info!("采集会话已关闭，共处理 {} 帧", processed);
    }
  }
}

fn capture_loop<I, E, D>(
  frames: I,
  mut detector: D,
  slot: &FrameSlot<RgbaFrame>,
  events: &SyncSender<DetectEvent>,
  stop: &AtomicBool,
) -> u64
where
  I: Iterator<Item = Result<RgbaFrame, E>>,
  E: Display,
  D: Detector,
  D::Error: Display,
{
  info!("采集线程启动");
  let mut processed = 0u64;

  for frame in frames {
    if stop.load(Ordering::Acquire) {
      info!("收到停止请求，退出采集循环");
      break;
    }

    let frame = match frame {
      Ok(frame) => Arc::new(frame),
      Err(e) => {
        error!("获取帧失败，跳过: {}", e);
        continue;
      }
    };
    slot.store(frame.clone());

    let now = Instant::now();
    let result = match detector.detect(&frame) {
      Ok(result) => result,
      Err(e) => {
        error!("推理失败，跳过本帧: {}", e);
        continue;
      }
    };
    let elapsed = now.elapsed();
    processed += 1;
    debug!(
      "第 {} 帧推理完成，耗时: {:.2?}，检测到 {} 个目标",
      processed,
      elapsed,
      result.len()
    );

    match deliver(events, DetectEvent::from_result(result, elapsed, &frame), stop) {
      Delivery::Sent => {}
      Delivery::Stopped => {
        info!("收到停止请求，丢弃未送达的结果");
        break;
      }
      Delivery::Disconnected => {
        warn!("显示端已关闭，退出采集循环");
        break;
      }
    }
  }

  detector.clear();
  info!("采集线程退出，检测器资源已释放");
  processed
}

enum Delivery {
  Sent,
  Stopped,
  Disconnected,
}

/// 等待显示端取走上一条结果，期间响应停止请求
fn deliver(
  events: &SyncSender<DetectEvent>,
  mut event: DetectEvent,
  stop: &AtomicBool,
) -> Delivery {
  loop {
    match events.try_send(event) {
      Ok(()) => return Delivery::Sent,
      Err(TrySendError::Disconnected(_)) => return Delivery::Disconnected,
      Err(TrySendError::Full(pending)) => {
        if stop.load(Ordering::Acquire) {
          return Delivery::Stopped;
        }
        event = pending;
        thread::sleep(SEND_RETRY_INTERVAL);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, DetectResult};
  use std::sync::{Mutex, mpsc};

  #[derive(Default)]
  struct Calls {
    setup: usize,
    detect: usize,
    clear: usize,
  }

  struct CountingDetector {
    calls: Arc<Mutex<Calls>>,
    fail_setup: bool,
  }

  impl Detector for CountingDetector {
    type Error = String;

    fn setup(&mut self) -> Result<(), Self::Error> {
      self.calls.lock().unwrap().setup += 1;
      if self.fail_setup {
        Err("no model".to_string())
      } else {
        Ok(())
      }
    }

    fn detect(&mut self, frame: &RgbaFrame) -> Result<DetectResult, Self::Error> {
      let mut calls = self.calls.lock().unwrap();
      calls.detect += 1;
      match frame.width() {
        1 => Ok(DetectResult::default()),
        3 => Err("boom".to_string()),
        _ => Ok(DetectResult::from(vec![DetectItem {
          label: "hand".to_string(),
          score: 0.9,
          bbox: [0.0, 0.0, 1.0, 1.0],
        }])),
      }
    }

    fn clear(&mut self) {
      self.calls.lock().unwrap().clear += 1;
    }
  }

  fn frame(width: u32) -> Result<RgbaFrame, String> {
    Ok(RgbaFrame::from_raw(width, 1, vec![0; width as usize * 4]).unwrap())
  }

  #[test]
  fn failed_frames_are_skipped_and_the_rest_delivered() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let detector = CountingDetector {
      calls: calls.clone(),
      fail_setup: false,
    };
    let frames = vec![frame(1), Err("camera hiccup".to_string()), frame(3), frame(2)];
    let slot = Arc::new(FrameSlot::new());
    let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);

    let mut session = CaptureSession::spawn(frames.into_iter(), detector, slot.clone(), tx).unwrap();
    let events: Vec<DetectEvent> = rx.iter().collect();
    assert_eq!(session.stop(), 2);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], DetectEvent::Empty);
    assert!(matches!(
      &events[1],
      DetectEvent::Detected {
        frame_width: 2,
        frame_height: 1,
        ..
      }
    ));

    let calls = calls.lock().unwrap();
    assert_eq!((calls.setup, calls.detect, calls.clear), (1, 3, 1));
    assert!(slot.is_empty());
  }

  #[test]
  fn setup_failure_aborts_startup() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let detector = CountingDetector {
      calls: calls.clone(),
      fail_setup: true,
    };
    let (tx, _rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
    let result = CaptureSession::spawn(
      vec![frame(2)].into_iter(),
      detector,
      Arc::new(FrameSlot::new()),
      tx,
    );
    assert!(matches!(result, Err(CaptureError::DetectorSetup(_))));
    assert_eq!(calls.lock().unwrap().detect, 0);
  }

  #[test]
  fn worker_exits_when_presenter_goes_away() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let detector = CountingDetector {
      calls: calls.clone(),
      fail_setup: false,
    };
    let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
    drop(rx);

    let frames = std::iter::repeat_with(|| frame(2));
    let mut session =
      CaptureSession::spawn(frames, detector, Arc::new(FrameSlot::new()), tx).unwrap();
    while session.is_running() {
      thread::sleep(std::time::Duration::from_millis(1));
    }
    assert_eq!(session.stop(), 1);
    assert_eq!(calls.lock().unwrap().clear, 1);
  }

  #[test]
  fn worker_waits_for_the_presenter_and_still_stops() {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let detector = CountingDetector {
      calls: calls.clone(),
      fail_setup: false,
    };
    let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);

    let frames = std::iter::repeat_with(|| frame(2));
    let mut session =
      CaptureSession::spawn(frames, detector, Arc::new(FrameSlot::new()), tx).unwrap();
    while calls.lock().unwrap().detect < 2 {
      thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(20));

    // 一条结果在通道中，另一条等待送达
    assert_eq!(calls.lock().unwrap().detect, 2);
    assert_eq!(session.stop(), 2);
    assert_eq!(rx.try_iter().count(), 1);
    assert_eq!(calls.lock().unwrap().clear, 1);
  }
}
