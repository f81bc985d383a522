// 该文件是 Xunjing （寻景） 项目的一部分。
// src/worker.rs - 生产者/消费者流处理
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

//! # 流处理
//!
//! `StreamWorker::run` 启动两个线程：生产者从输入源取帧并推入有界队列，
//! 消费者从队列取帧、执行识别并调用回调。队列满时生产者阻塞。
//! 输入源结束（或被 `stop`）后，消费者处理完队列中剩余的帧再退出。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::frame::{ColorFormat, FrameBuffer};
use crate::matching::MatchError;
use crate::queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
use crate::recognition::{MatchRecognition, RecognitionError, RecognitionResult};
use crate::source::{Frame, FrameSource, SourceError};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);

pub type ResultCallback = Box<dyn Fn(Vec<RecognitionResult>, FrameBuffer) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(PipelineError) + Send + Sync>;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入源错误: {0}")]
  Source(#[from] SourceError),
  #[error("匹配错误: {0}")]
  Match(#[from] MatchError),
  #[error("识别错误: {0}")]
  Recognition(#[from] RecognitionError),
}

/// 一次 `run` 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
  /// 从输入源取得的帧数
  pub produced: u64,
  /// 推入队列的帧数
  pub queued: u64,
  /// 完成识别的帧数
  pub processed: u64,
  /// 通过错误回调报告的错误数
  pub errors: u64,
}

/// 在其他线程中停止工作器
#[derive(Clone)]
pub struct StopHandle {
  source: Arc<dyn FrameSource>,
}

impl StopHandle {
  pub fn new(source: Arc<dyn FrameSource>) -> Self {
    Self { source }
  }

  pub fn stop(&self) {
    info!("请求停止输入源");
    self.source.finish();
  }
}

#[derive(Default)]
pub struct StreamWorkerBuilder {
  source: Option<Arc<dyn FrameSource>>,
  recognition: Option<MatchRecognition>,
  on_result: Option<ResultCallback>,
  on_error: Option<ErrorCallback>,
  skip_frames: usize,
  queue_capacity: usize,
  color_format: ColorFormat,
}

impl StreamWorkerBuilder {
  pub fn new() -> Self {
    Self {
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      ..Self::default()
    }
  }

  pub fn source(mut self, source: Arc<dyn FrameSource>) -> Self {
    self.source = Some(source);
    self
  }

  pub fn recognition(mut self, recognition: MatchRecognition) -> Self {
    self.recognition = Some(recognition);
    self
  }

  pub fn on_result<F>(mut self, callback: F) -> Self
  where
    F: Fn(Vec<RecognitionResult>, FrameBuffer) + Send + Sync + 'static,
  {
    self.on_result = Some(Box::new(callback));
    self
  }

  pub fn on_error<F>(mut self, callback: F) -> Self
  where
    F: Fn(PipelineError) + Send + Sync + 'static,
  {
    self.on_error = Some(Box::new(callback));
    self
  }

  pub fn skip_frames(mut self, skip_frames: usize) -> Self {
    self.skip_frames = skip_frames;
    self
  }

  /// 零容量按默认容量处理
  pub fn queue_capacity(mut self, capacity: usize) -> Self {
    self.queue_capacity = capacity;
    self
  }

  pub fn color_format(mut self, format: ColorFormat) -> Self {
    self.color_format = format;
    self
  }

  /// 应用配置中与流处理相关的部分
  pub fn config(self, config: &PipelineConfig) -> Self {
    self
      .skip_frames(config.skip_frames)
      .queue_capacity(config.queue_capacity)
      .color_format(config.color_format)
  }

  pub fn build(self) -> Result<StreamWorker, ConfigError> {
    let source = self.source.ok_or(ConfigError::NoSource)?;
    let recognition = self.recognition.ok_or(ConfigError::NoRecognition)?;
    let on_result = self.on_result.ok_or(ConfigError::NoResultCallback)?;
    let on_error = self
      .on_error
      .unwrap_or_else(|| Box::new(|e: PipelineError| error!("流水线错误: {}", e)));

    Ok(StreamWorker {
      source,
      recognition,
      on_result,
      on_error,
      skip_frames: self.skip_frames,
      queue_capacity: self.queue_capacity,
      color_format: self.color_format,
    })
  }
}

pub struct StreamWorker {
  source: Arc<dyn FrameSource>,
  recognition: MatchRecognition,
  on_result: ResultCallback,
  on_error: ErrorCallback,
  skip_frames: usize,
  queue_capacity: usize,
  color_format: ColorFormat,
}

/// 离开作用域时关闭队列，线程异常退出时另一端也不会永远阻塞
struct FinishOnDrop<'a, T>(&'a BoundedQueue<T>);

impl<T> Drop for FinishOnDrop<'_, T> {
  fn drop(&mut self) {
    self.0.finish();
  }
}

#[derive(Default)]
struct ProducerStats {
  produced: u64,
  queued: u64,
  errors: u64,
}

#[derive(Default)]
struct ConsumerStats {
  processed: u64,
  errors: u64,
}

impl StreamWorker {
  pub fn builder() -> StreamWorkerBuilder {
    StreamWorkerBuilder::new()
  }

  pub fn stop_handle(&self) -> StopHandle {
    StopHandle::new(self.source.clone())
  }

  /// 结束输入源；生产者在下一次轮询时退出
  pub fn stop(&self) {
    self.stop_handle().stop();
  }

  pub fn recognition(&self) -> &MatchRecognition {
    &self.recognition
  }

  pub fn recognition_mut(&mut self) -> &mut MatchRecognition {
    &mut self.recognition
  }

  /// 阻塞直到生产者与消费者都退出
  pub fn run(&mut self) -> WorkerStats {
    let queue = BoundedQueue::new(self.queue_capacity);
    let Self {
      source,
      recognition,
      on_result,
      on_error,
      skip_frames,
      color_format,
      ..
    } = self;
    let (source, on_result, on_error) = (&**source, &**on_result, &**on_error);
    let (skip_frames, color_format, queue) = (*skip_frames, *color_format, &queue);

    info!(
      "启动流处理: 跳帧 {}, 队列容量 {}, 输出格式 {:?}",
      skip_frames,
      queue.capacity(),
      color_format
    );
    let started = Instant::now();

    let (producer, consumer) = thread::scope(|s| {
      let producer = thread::Builder::new()
        .name("xunjing-producer".to_string())
        .spawn_scoped(s, move || produce(source, queue, skip_frames, on_error));
      let consumer = thread::Builder::new()
        .name("xunjing-consumer".to_string())
        .spawn_scoped(s, move || {
          consume(queue, recognition, color_format, on_result, on_error)
        });

      if let Err(e) = &producer {
        error!("无法启动生产者线程: {}", e);
        queue.finish();
      }
      if let Err(e) = &consumer {
        error!("无法启动消费者线程: {}", e);
        queue.finish();
      }

      let producer = match producer {
        Ok(handle) => handle.join().unwrap_or_else(|_| {
          error!("生产者线程异常退出");
          ProducerStats::default()
        }),
        Err(_) => ProducerStats::default(),
      };
      let consumer = match consumer {
        Ok(handle) => handle.join().unwrap_or_else(|_| {
          error!("消费者线程异常退出");
          ConsumerStats::default()
        }),
        Err(_) => ConsumerStats::default(),
      };
      (producer, consumer)
    });

    let stats = WorkerStats {
      produced: producer.produced,
      queued: producer.queued,
      processed: consumer.processed,
      errors: producer.errors + consumer.errors,
    };
    info!("流处理结束: {:?}, 耗时 {:.2?}", stats, started.elapsed());
    stats
  }
}

fn produce(
  source: &dyn FrameSource,
  queue: &BoundedQueue<Frame>,
  skip_frames: usize,
  on_error: &(dyn Fn(PipelineError) + Send + Sync),
) -> ProducerStats {
  let _finish = FinishOnDrop(queue);
  let mut stats = ProducerStats::default();
  let stride = skip_frames as u64 + 1;

  while !source.is_finished() {
    match source.obtain_image() {
      Ok(Some(frame)) => {
        let keep = stats.produced % stride == 0;
        stats.produced += 1;
        if !keep {
          debug!("跳过第 {} 帧", frame.index);
          continue;
        }
        if queue.push(frame).is_err() {
          warn!("队列已关闭，生产者退出");
          break;
        }
        stats.queued += 1;
      }
      Ok(None) => thread::sleep(IDLE_POLL_INTERVAL),
      Err(e) => {
        error!("读取输入帧失败: {}", e);
        stats.errors += 1;
        on_error(PipelineError::Source(e));
        break;
      }
    }
  }

  debug!("生产者退出: 取帧 {}, 入队 {}", stats.produced, stats.queued);
  stats
}

fn consume(
  queue: &BoundedQueue<Frame>,
  recognition: &mut MatchRecognition,
  color_format: ColorFormat,
  on_result: &(dyn Fn(Vec<RecognitionResult>, FrameBuffer) + Send + Sync),
  on_error: &(dyn Fn(PipelineError) + Send + Sync),
) -> ConsumerStats {
  let _finish = FinishOnDrop(queue);
  let mut stats = ConsumerStats::default();

  while let Some(frame) = queue.pop() {
    let started = Instant::now();
    let buffer = FrameBuffer::convert(&frame.image, color_format);

    match recognition.process(&frame.image) {
      Ok(output) => {
        let elapsed = started.elapsed();
        info!(
          "第 {} 帧处理完成: {} 个结果, 耗时 {:.2?}",
          frame.index,
          output.results.len(),
          elapsed
        );
        on_result(output.results, buffer);
        for e in output.errors {
          stats.errors += 1;
          on_error(PipelineError::Match(e));
        }
      }
      Err(e) => {
        warn!("第 {} 帧识别失败: {}", frame.index, e);
        stats.errors += 1;
        on_error(PipelineError::Recognition(e));
      }
    }
    stats.processed += 1;
  }

  debug!("消费者退出: 处理 {} 帧", stats.processed);
  stats
}
