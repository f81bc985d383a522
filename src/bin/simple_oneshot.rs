// 该文件是 Xunjing （寻景） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧识别测试程序
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
  config::{ModelSpec, PipelineConfig},
  matching::FastBriefBackend,
  output::OutputWrapper,
  recognition::MatchRecognition,
  source::SourceWrapper,
  task::{OneShotTask, Task},
};

/// 对输入源的第一帧做一次识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 参考目标 id=path
  #[arg(long = "model", value_name = "ID=PATH", required = true)]
  pub models: Vec<ModelSpec>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut recognition =
    MatchRecognition::from_config(Arc::new(FastBriefBackend::new()), &PipelineConfig::default())?;
  for spec in args.models.iter() {
    recognition.register_model(spec.id, spec.load()?)?;
  }

  let source = SourceWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let results = OneShotTask::default().run_task(source, recognition, output)?;
  info!("识别到 {} 个目标", results.len());
  for result in results.iter() {
    info!("  - 模型 {}: {:?}", result.model_id, result.quad.corners);
  }

  Ok(())
}
