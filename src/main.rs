// 该文件是 Xunjing （寻景） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use xunjing::{
  FromUrl,
  config::{ModelSpec, PipelineConfig, parse_rect, parse_size},
  frame::ColorFormat,
  geometry::Rect,
  matching::{FastBriefBackend, MatchingConfig},
  output::OutputWrapper,
  recognition::{FixedRegions, MatchRecognition},
  source::{FrameSource, SourceWrapper},
  task::{ContinuousTask, Task},
};

/// Xunjing 实时参考目标识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 参考目标，格式为 id=path，可重复
  #[arg(long = "model", value_name = "ID=PATH", required = true)]
  pub models: Vec<ModelSpec>,
  /// 输入来源，如 image:///a.png?repeat=10、dir:///frames、v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，如 log://、image:///out.png、folder:///records?always
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 每推送一帧后跳过的帧数
  #[arg(long, default_value_t = 0)]
  pub skip_frames: usize,
  /// 帧队列容量
  #[arg(long, default_value_t = 5)]
  pub queue_capacity: usize,
  /// 工作分辨率
  #[arg(long, value_name = "WxH", value_parser = parse_size, default_value = "1280x720")]
  pub working_size: (u32, u32),
  /// 匹配线程数，默认使用全部核心
  #[arg(long)]
  pub threads: Option<usize>,
  /// 输出帧颜色格式: rgb, bgr, rgba, gray
  #[arg(long, default_value = "rgb")]
  pub color_format: ColorFormat,
  /// 固定候选区域 x,y,w,h（工作分辨率坐标），可重复
  #[arg(long = "region", value_name = "X,Y,W,H", value_parser = parse_rect)]
  pub regions: Vec<Rect>,
  /// 处理指定帧数后退出
  #[arg(long)]
  pub frame_number: Option<u64>,
  /// 比率测试阈值
  #[arg(long, default_value_t = 0.75)]
  pub ratio: f32,
  /// 四边形最小边长（像素）
  #[arg(long, default_value_t = 10.0)]
  pub min_side: f32,
  /// 保留的最大匹配数
  #[arg(long, default_value_t = 100)]
  pub max_matches: usize,
}

impl Args {
  fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      skip_frames: self.skip_frames,
      queue_capacity: self.queue_capacity,
      working_size: self.working_size,
      color_format: self.color_format,
      worker_threads: self.threads,
      matching: MatchingConfig {
        ratio: self.ratio,
        min_side: self.min_side,
        max_matches: self.max_matches,
        ..MatchingConfig::default()
      },
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("Xunjing 参考目标识别");
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);
  info!("模型数量: {}", args.models.len());

  let config = args.pipeline_config();
  let mut recognition = MatchRecognition::from_config(Arc::new(FastBriefBackend::new()), &config)?;
  if !args.regions.is_empty() {
    recognition = recognition.with_region_proposer(FixedRegions(args.regions.clone()));
  }
  for spec in args.models.iter() {
    info!("正在加载模型 {}: {}", spec.id, spec.path.display());
    recognition.register_model(spec.id, spec.load()?)?;
  }

  let source: Arc<dyn FrameSource> = Arc::new(SourceWrapper::from_url(&args.input)?);
  let output = OutputWrapper::from_url(&args.output)?;

  let stats = ContinuousTask::new(config)
    .with_frame_number(args.frame_number)
    .run_task(source, recognition, output)?;

  info!(
    "处理完成: 取帧 {}, 处理 {}, 错误 {}",
    stats.produced, stats.processed, stats.errors
  );
  Ok(())
}
