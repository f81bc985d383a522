// 该文件是 Xunjing （寻景） 项目的一部分。
// src/queue.rs - 有界阻塞帧队列
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

//! 生产者/消费者之间的有界 FIFO 队列。
//!
//! `push` 在队列满时阻塞，`pop` 在队列空时阻塞；调用 `finish` 之后
//! 所有等待者都会被唤醒，`pop` 在队列排空后返回 `None`。

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// 未指定容量时的默认值
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

struct State<T> {
  items: VecDeque<T>,
  finished: bool,
}

pub struct BoundedQueue<T> {
  state: Mutex<State<T>>,
  not_empty: Condvar,
  not_full: Condvar,
  capacity: usize,
}

impl<T> BoundedQueue<T> {
  /// 创建队列；容量为 0 时使用默认容量
  pub fn new(capacity: usize) -> Self {
    let capacity = if capacity == 0 {
      DEFAULT_QUEUE_CAPACITY
    } else {
      capacity
    };

    Self {
      state: Mutex::new(State {
        items: VecDeque::with_capacity(capacity),
        finished: false,
      }),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
      capacity,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.state.lock().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_finished(&self) -> bool {
    self.state.lock().finished
  }

  /// 阻塞直到有空位后入队。队列已结束时把元素原样返还。
  pub fn push(&self, item: T) -> Result<(), T> {
    let mut state = self.state.lock();
    while state.items.len() >= self.capacity && !state.finished {
      self.not_full.wait(&mut state);
    }
    if state.finished {
      return Err(item);
    }
    state.items.push_back(item);
    drop(state);
    self.not_empty.notify_one();
    Ok(())
  }

  /// 阻塞直到有元素或队列结束。结束且为空时返回 None。
  pub fn pop(&self) -> Option<T> {
    let mut state = self.state.lock();
    while state.items.is_empty() && !state.finished {
      self.not_empty.wait(&mut state);
    }
    let item = state.items.pop_front();
    drop(state);
    if item.is_some() {
      self.not_full.notify_one();
    }
    item
  }

  /// 标记结束并唤醒所有等待者
  pub fn finish(&self) {
    self.state.lock().finished = true;
    self.not_empty.notify_all();
    self.not_full.notify_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::thread;
  use std::time::Duration;

  #[test]
  fn zero_capacity_uses_default() {
    let queue = BoundedQueue::<u32>::new(0);
    assert_eq!(queue.capacity(), DEFAULT_QUEUE_CAPACITY);
  }

  #[test]
  fn pop_returns_push_order() {
    let queue = BoundedQueue::new(3);
    for i in 0..3 {
      queue.push(i).unwrap();
    }
    queue.finish();
    let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
    assert_eq!(drained, vec![0, 1, 2]);
  }

  #[test]
  fn finish_wakes_blocked_pop() {
    let queue = Arc::new(BoundedQueue::<u32>::new(2));
    let waiter = {
      let queue = queue.clone();
      thread::spawn(move || queue.pop())
    };
    thread::sleep(Duration::from_millis(50));
    queue.finish();
    assert_eq!(waiter.join().unwrap(), None);
  }

  #[test]
  fn push_after_finish_is_returned() {
    let queue = BoundedQueue::new(1);
    queue.finish();
    assert_eq!(queue.push(7), Err(7));
  }

  #[test]
  fn size_never_exceeds_capacity_under_contention() {
    const CAPACITY: usize = 3;
    const ITEMS: usize = 500;

    let queue = Arc::new(BoundedQueue::new(CAPACITY));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let producer = {
      let queue = queue.clone();
      let max_seen = max_seen.clone();
      thread::spawn(move || {
        for i in 0..ITEMS {
          queue.push(i).unwrap();
          max_seen.fetch_max(queue.len(), Ordering::SeqCst);
        }
        queue.finish();
      })
    };

    let mut received = Vec::with_capacity(ITEMS);
    while let Some(item) = queue.pop() {
      max_seen.fetch_max(queue.len(), Ordering::SeqCst);
      received.push(item);
    }
    producer.join().unwrap();

    assert!(max_seen.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
  }
}
