// 该文件是 Xunjing （寻景） 项目的一部分。
// src/task.rs - 任务定义
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

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{thread, time::Duration};

use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::frame::{ColorFormat, FrameBuffer};
use crate::output::Render;
use crate::recognition::{MatchRecognition, RecognitionResult};
use crate::source::FrameSource;
use crate::worker::{StopHandle, StreamWorker, WorkerStats};

const FORCE_EXIT_TIMEOUT: Duration = Duration::from_secs(30);
const FIRST_FRAME_POLL: Duration = Duration::from_millis(10);

pub trait Task<S, R, O>: Sized {
  type Error;
  type Output;
  fn run_task(self, source: S, recognition: R, output: O) -> Result<Self::Output, Self::Error>;
}

/// 只处理输入源的第一帧，在当前线程同步执行
#[derive(Debug, Default)]
pub struct OneShotTask {
  color_format: ColorFormat,
}

impl OneShotTask {
  pub fn with_color_format(mut self, color_format: ColorFormat) -> Self {
    self.color_format = color_format;
    self
  }
}

impl<S, O> Task<S, MatchRecognition, O> for OneShotTask
where
  S: FrameSource,
  O: Render<FrameBuffer, [RecognitionResult]>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;
  type Output = Vec<RecognitionResult>;

  fn run_task(
    self,
    source: S,
    mut recognition: MatchRecognition,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = loop {
      if let Some(frame) = source.obtain_image()? {
        break frame;
      }
      if source.is_finished() {
        anyhow::bail!("没有输入帧");
      }
      thread::sleep(FIRST_FRAME_POLL);
    };
    info!("输入帧获取成功 ({}x{})，开始识别...", frame.image.width(), frame.image.height());

    let now = std::time::Instant::now();
    let recognition = recognition.process(&frame.image)?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());
    for e in recognition.errors.iter() {
      warn!("匹配错误: {}", e);
    }

    let buffer = FrameBuffer::convert(&frame.image, self.color_format);
    output.render_result(&buffer, recognition.results.as_slice())?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(recognition.results)
  }
}

/// 持续处理输入源，直到输入结束、收到中断信号或达到指定帧数
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
  config: PipelineConfig,
  handle_ctrlc: bool,
}

impl ContinuousTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      frame_number: None,
      config,
      handle_ctrlc: true,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 关闭 Ctrl-C 处理，用于嵌入其他程序或测试
  pub fn without_ctrlc(mut self) -> Self {
    self.handle_ctrlc = false;
    self
  }
}

fn install_ctrlc(handle: StopHandle) -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handle.stop();
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_TIMEOUT);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
}

impl<O> Task<Arc<dyn FrameSource>, MatchRecognition, O> for ContinuousTask
where
  O: Render<FrameBuffer, [RecognitionResult]> + Send + Sync + 'static,
  O::Error: Display,
{
  type Error = anyhow::Error;
  type Output = WorkerStats;

  fn run_task(
    self,
    source: Arc<dyn FrameSource>,
    recognition: MatchRecognition,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let stop = StopHandle::new(source.clone());
    if self.handle_ctrlc {
      install_ctrlc(stop.clone())?;
    }

    let rendered = AtomicU64::new(0);
    let frame_number = self.frame_number;
    let mut worker = StreamWorker::builder()
      .config(&self.config)
      .source(source)
      .recognition(recognition)
      .on_result(move |results, frame| {
        if let Err(e) = output.render_result(&frame, results.as_slice()) {
          error!("渲染失败: {}", e);
        }
        let count = rendered.fetch_add(1, Ordering::SeqCst) + 1;
        if frame_number.is_some_and(|n| count == n) {
          info!("达到指定帧数 {}, 停止输入", count);
          stop.stop();
        }
      })
      .on_error(|e| warn!("流水线错误: {}", e))
      .build()?;

    let stats = worker.run();
    info!("任务完成，退出");
    Ok(stats)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matching::{FastBriefBackend, FeatureMatching, MatchingConfig};
  use crate::output::LogOutput;
  use crate::source::MemorySource;
  use image::RgbImage;

  fn recognition() -> MatchRecognition {
    MatchRecognition::new(FeatureMatching::new(
      Arc::new(FastBriefBackend::new()),
      MatchingConfig::default(),
    ))
    .with_working_size(32, 32)
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let source = MemorySource::new(Vec::new());
    let result = OneShotTask::default().run_task(source, recognition(), LogOutput::default());
    assert!(result.is_err());
  }

  #[test]
  fn one_shot_processes_first_frame() {
    let source = MemorySource::new(vec![RgbImage::new(32, 32), RgbImage::new(32, 32)]);
    let results = OneShotTask::default()
      .run_task(source, recognition(), LogOutput::default())
      .unwrap();
    assert!(results.is_empty());
  }

  #[test]
  fn continuous_stops_after_frame_number() {
    let source: Arc<dyn FrameSource> =
      Arc::new(MemorySource::new((0..50).map(|_| RgbImage::new(32, 32))));
    let stats = ContinuousTask::new(PipelineConfig {
      queue_capacity: 1,
      ..PipelineConfig::default()
    })
    .with_frame_number(Some(3))
    .without_ctrlc()
    .run_task(source, recognition(), LogOutput::default())
    .unwrap();
    assert!(stats.processed >= 3);
    assert!(stats.processed < 50);
  }
}
