// 该文件是 Shoushi （手势） 项目的一部分。
// src/slot.rs - 最新帧单槽
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

use arc_swap::ArcSwapOption;

/// 只保存最新值的共享单槽
///
/// 写入覆盖旧值，后写者胜；读取无锁，读到的总是某一次完整写入的值。
/// 被覆盖的旧值在最后一个读者释放后回收。
#[derive(Debug)]
pub struct FrameSlot<T> {
  inner: ArcSwapOption<T>,
}

impl<T> Default for FrameSlot<T> {
  fn default() -> Self {
    Self {
      inner: ArcSwapOption::empty(),
    }
  }
}

impl<T> FrameSlot<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn store(&self, value: Arc<T>) {
    self.inner.store(Some(value));
  }

  pub fn load(&self) -> Option<Arc<T>> {
    self.inner.load_full()
  }

  /// 清空并取出当前值
  pub fn take(&self) -> Option<Arc<T>> {
    self.inner.swap(None)
  }

  pub fn is_empty(&self) -> bool {
    self.inner.load().is_none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn last_write_wins() {
    let slot = FrameSlot::new();
    assert!(slot.is_empty());
    slot.store(Arc::new(1));
    slot.store(Arc::new(2));
    assert_eq!(slot.load().as_deref(), Some(&2));
  }

  #[test]
  fn superseded_values_are_released() {
    let slot = FrameSlot::new();
    let first = Arc::new(String::from("first"));
    slot.store(first.clone());
    assert_eq!(Arc::strong_count(&first), 2);

    slot.store(Arc::new(String::from("second")));
    assert_eq!(Arc::strong_count(&first), 1);

    let taken = slot.take().unwrap();
    assert_eq!(taken.as_str(), "second");
    assert!(slot.is_empty());
    assert!(slot.load().is_none());
  }

  #[test]
  fn readers_see_whole_values_across_threads() {
    let slot = Arc::new(FrameSlot::new());
    let writer = {
      let slot = slot.clone();
      thread::spawn(move || {
        for i in 0..1000u32 {
          slot.store(Arc::new([i; 8]));
        }
      })
    };

    for _ in 0..1000 {
      if let Some(value) = slot.load() {
        assert!(value.iter().all(|v| *v == value[0]));
      }
    }
    writer.join().unwrap();
    assert_eq!(slot.load().as_deref(), Some(&[999u32; 8]));
  }
}
