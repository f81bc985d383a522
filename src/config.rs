// 该文件是 Xunjing （寻景） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::path::PathBuf;
use std::str::FromStr;

use image::RgbImage;
use thiserror::Error;

use crate::frame::ColorFormat;
use crate::geometry::Rect;
use crate::matching::MatchingConfig;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_WORKING_SIZE: (u32, u32) = (1280, 720);

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("未设置输入源")]
  NoSource,
  #[error("未设置识别引擎")]
  NoRecognition,
  #[error("未设置结果回调")]
  NoResultCallback,
  #[error("无效的输入源: {0}")]
  InvalidSource(String),
  #[error("无效的配置值: {0}")]
  InvalidValue(String),
  #[error("线程池创建失败: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 流水线的可调参数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  /// 每推送一帧之后丢弃的帧数
  pub skip_frames: usize,
  pub queue_capacity: usize,
  /// 匹配时使用的工作分辨率
  pub working_size: (u32, u32),
  /// 结果回调收到的帧格式
  pub color_format: ColorFormat,
  /// 匹配线程数，None 时使用 rayon 全局线程池
  pub worker_threads: Option<usize>,
  pub matching: MatchingConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      skip_frames: 0,
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      working_size: DEFAULT_WORKING_SIZE,
      color_format: ColorFormat::default(),
      worker_threads: None,
      matching: MatchingConfig::default(),
    }
  }
}

impl PipelineConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    let (width, height) = self.working_size;
    if width == 0 || height == 0 {
      return Err(ConfigError::InvalidValue(format!(
        "工作分辨率不能为零: {}x{}",
        width, height
      )));
    }
    if self.worker_threads == Some(0) {
      return Err(ConfigError::InvalidValue("匹配线程数不能为零".to_string()));
    }
    self.matching.validate().map_err(ConfigError::InvalidValue)
  }
}

/// 命令行中的模型描述，格式为 `id=path`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
  pub id: i32,
  pub path: PathBuf,
}

impl ModelSpec {
  pub fn load(&self) -> Result<RgbImage, image::ImageError> {
    Ok(image::open(&self.path)?.to_rgb8())
  }
}

impl FromStr for ModelSpec {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (id, path) = s
      .split_once('=')
      .ok_or_else(|| format!("模型描述应为 id=path: {}", s))?;
    let id = id
      .trim()
      .parse()
      .map_err(|e| format!("无效的模型标识 '{}': {}", id, e))?;
    let path = path.trim();
    if path.is_empty() {
      return Err(format!("模型 {} 缺少图像路径", id));
    }
    Ok(Self {
      id,
      path: PathBuf::from(path),
    })
  }
}

/// 解析 `x,y,w,h` 形式的矩形
pub fn parse_rect(s: &str) -> Result<Rect, String> {
  let parts = s
    .split(',')
    .map(|p| p.trim().parse::<i32>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| format!("无效的区域 '{}': {}", s, e))?;
  match parts[..] {
    [x, y, width, height] if width > 0 && height > 0 => Ok(Rect::new(x, y, width, height)),
    [_, _, _, _] => Err(format!("区域宽高必须为正: {}", s)),
    _ => Err(format!("区域应为 x,y,w,h: {}", s)),
  }
}

/// 解析 `WxH` 形式的分辨率
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
  let (w, h) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("分辨率应为 WxH: {}", s))?;
  let w = w.trim().parse().map_err(|e| format!("无效的宽度 '{}': {}", w, e))?;
  let h = h.trim().parse().map_err(|e| format!("无效的高度 '{}': {}", h, e))?;
  Ok((w, h))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = PipelineConfig::default();
    assert_eq!(config.queue_capacity, 5);
    assert_eq!(config.working_size, (1280, 720));
    assert_eq!(config.color_format, ColorFormat::Rgb);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn zero_values_are_rejected() {
    let config = PipelineConfig {
      working_size: (0, 720),
      ..PipelineConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

    let config = PipelineConfig {
      worker_threads: Some(0),
      ..PipelineConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
  }

  #[test]
  fn model_spec() {
    let spec: ModelSpec = "3=assets/logo.png".parse().unwrap();
    assert_eq!(spec.id, 3);
    assert_eq!(spec.path, PathBuf::from("assets/logo.png"));
    assert!("logo.png".parse::<ModelSpec>().is_err());
    assert!("x=logo.png".parse::<ModelSpec>().is_err());
    assert!("1=".parse::<ModelSpec>().is_err());
  }

  #[test]
  fn rect_and_size() {
    assert_eq!(parse_rect("10, 20,30,40"), Ok(Rect::new(10, 20, 30, 40)));
    assert!(parse_rect("1,2,3").is_err());
    assert!(parse_rect("1,2,0,4").is_err());
    assert_eq!(parse_size("1920x1080"), Ok((1920, 1080)));
    assert!(parse_size("1920").is_err());
  }
}
