// 该文件是 Xunjing （寻景） 项目的一部分。
// src/recognition.rs - 多模型识别编排
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
use std::time::Instant;

use image::RgbImage;
use image::imageops::FilterType;
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DEFAULT_WORKING_SIZE, PipelineConfig};
use crate::geometry::{Quad, Rect};
use crate::matching::{Execution, FeatureBackend, FeatureMatching, SceneModel};
use crate::model::{ModelError, ModelRegistry, ObjectModel};

mod error_list;
pub use self::error_list::{ErrorCollector, ErrorList};

/// 一个模型在一帧中的定位结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionResult {
  /// 置信度，取值 0 - 100
  pub score: u8,
  pub model_id: i32,
  /// 原始帧坐标下的四边形
  pub quad: Quad,
}

impl RecognitionResult {
  pub fn scale(&self, sx: f32, sy: f32) -> Self {
    Self {
      quad: self.quad.scale(sx, sy),
      ..*self
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("识别失败，{0}")]
  Aggregate(ErrorList),
}

/// 一帧的识别输出：结果与各任务的错误一同返回
#[derive(Debug, Default)]
pub struct Recognition {
  pub results: Vec<RecognitionResult>,
  pub errors: ErrorList,
}

impl Recognition {
  /// 有任何任务出错时整体视为失败
  pub fn into_result(self) -> Result<Vec<RecognitionResult>, RecognitionError> {
    if self.errors.is_empty() {
      Ok(self.results)
    } else {
      Err(RecognitionError::Aggregate(self.errors))
    }
  }
}

/// 候选区域提议，区域坐标为工作分辨率下的坐标
pub trait RegionProposer: Send + Sync {
  fn propose(&self, image: &RgbImage) -> Vec<Rect>;
}

/// 固定的候选区域列表
#[derive(Debug, Clone, Default)]
pub struct FixedRegions(pub Vec<Rect>);

impl RegionProposer for FixedRegions {
  fn propose(&self, _image: &RgbImage) -> Vec<Rect> {
    self.0.clone()
  }
}

/// 识别编排器：每帧缩放到工作分辨率，为每个模型启动一个匹配任务
pub struct MatchRecognition {
  registry: ModelRegistry,
  matching: FeatureMatching,
  proposer: Option<Box<dyn RegionProposer>>,
  working_size: (u32, u32),
  pool: Option<rayon::ThreadPool>,
  last_frame_size: Option<(u32, u32)>,
}

impl MatchRecognition {
  pub fn new(matching: FeatureMatching) -> Self {
    Self {
      registry: ModelRegistry::new(),
      matching,
      proposer: None,
      working_size: DEFAULT_WORKING_SIZE,
      pool: None,
      last_frame_size: None,
    }
  }

  /// 按配置构建，使用给定的特征后端
  pub fn from_config(
    backend: Arc<dyn FeatureBackend>,
    config: &PipelineConfig,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let recognition = Self::new(FeatureMatching::new(backend, config.matching.clone()))
      .with_working_size(config.working_size.0, config.working_size.1);
    match config.worker_threads {
      Some(threads) => recognition.with_threads(threads),
      None => Ok(recognition),
    }
  }

  pub fn with_working_size(mut self, width: u32, height: u32) -> Self {
    self.set_working_size(width, height);
    self
  }

  /// 使用独立的线程池执行匹配任务
  pub fn with_threads(mut self, threads: usize) -> Result<Self, ConfigError> {
    if threads == 0 {
      return Err(ConfigError::InvalidValue("匹配线程数不能为零".to_string()));
    }
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(threads)
      .thread_name(|i| format!("xunjing-match-{}", i))
      .build()?;
    self.pool = Some(pool);
    Ok(self)
  }

  pub fn with_region_proposer(mut self, proposer: impl RegionProposer + 'static) -> Self {
    self.set_region_proposer(Some(Box::new(proposer)));
    self
  }

  pub fn registry(&self) -> &ModelRegistry {
    &self.registry
  }

  pub fn registry_mut(&mut self) -> &mut ModelRegistry {
    &mut self.registry
  }

  pub fn matching(&self) -> &FeatureMatching {
    &self.matching
  }

  /// 注册模型并尽量提前计算特征；计算失败时留到首次匹配再报告
  pub fn register_model(&mut self, id: i32, image: RgbImage) -> Result<(), ModelError> {
    let model = self.registry.register(id, image)?;
    if let Err(e) = self.matching.prepare(model) {
      warn!("模型 {} 预计算特征失败: {}", id, e);
    }
    Ok(())
  }

  pub fn clear_ira(&mut self) {
    self.registry.clear_ira();
  }

  pub fn working_size(&self) -> (u32, u32) {
    self.working_size
  }

  /// 修改工作分辨率会使全部 IRA 失效
  pub fn set_working_size(&mut self, width: u32, height: u32) {
    if (width, height) != self.working_size {
      self.registry.clear_ira();
    }
    self.working_size = (width, height);
  }

  pub fn set_region_proposer(&mut self, proposer: Option<Box<dyn RegionProposer>>) {
    self.proposer = proposer;
  }

  /// 在一帧中搜索全部模型
  pub fn process(&mut self, frame: &RgbImage) -> Result<Recognition, RecognitionError> {
    let (orig_w, orig_h) = frame.dimensions();
    let (work_w, work_h) = self.working_size;
    if orig_w == 0 || orig_h == 0 || work_w == 0 || work_h == 0 {
      return Err(RecognitionError::EmptyFrame);
    }

    if self.last_frame_size != Some((orig_w, orig_h)) {
      if self.last_frame_size.is_some() {
        info!("输入尺寸变为 {}x{}，清空全部 IRA", orig_w, orig_h);
      }
      self.registry.clear_ira();
      self.last_frame_size = Some((orig_w, orig_h));
    }

    let started = Instant::now();
    let working = if (orig_w, orig_h) == (work_w, work_h) {
      frame.clone()
    } else {
      image::imageops::resize(frame, work_w, work_h, FilterType::Triangle)
    };

    let Self {
      registry,
      matching,
      proposer,
      pool,
      ..
    } = self;

    let mut regions: Vec<Option<Rect>> = proposer
      .as_ref()
      .map(|p| p.propose(&working).into_iter().map(Some).collect())
      .unwrap_or_default();
    if regions.is_empty() {
      regions.push(None);
    }

    let scene = SceneModel::new(working);
    let (sx, sy) = (orig_w as f32 / work_w as f32, orig_h as f32 / work_h as f32);
    let results = Mutex::new(Vec::with_capacity(registry.len()));
    let errors = ErrorCollector::new();

    let task = |model: &mut ObjectModel| {
      let mut last = None;
      for region in regions.iter() {
        match matching.match_model(&scene, model, *region) {
          Ok(Some(result)) => last = Some(result),
          Ok(None) => {}
          Err(e) => {
            warn!("模型 {} 匹配出错: {}", model.id(), e);
            errors.push(e);
            break;
          }
        }
      }
      if let Some(result) = last {
        results.lock().push(result.scale(sx, sy));
      }
    };

    let models = registry.models_mut();
    match (matching.execution(), pool.as_ref()) {
      (Execution::SingleContext, _) => models.iter_mut().for_each(&task),
      (Execution::Pooled, Some(pool)) => pool.install(|| models.par_iter_mut().for_each(&task)),
      (Execution::Pooled, None) => models.par_iter_mut().for_each(&task),
    }

    let recognition = Recognition {
      results: results.into_inner(),
      errors: errors.into_list(),
    };
    debug!(
      "识别完成: {} 个模型, {} 个结果, {} 个错误, 耗时 {:.2?}",
      registry.len(),
      recognition.results.len(),
      recognition.errors.len(),
      started.elapsed()
    );
    Ok(recognition)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Point;
  use crate::matching::{FastBriefBackend, MatchError, MatchingConfig};

  fn recognition() -> MatchRecognition {
    MatchRecognition::new(FeatureMatching::new(
      Arc::new(FastBriefBackend::new()),
      MatchingConfig::default(),
    ))
  }

  #[test]
  fn empty_frame_is_rejected() {
    let mut recognition = recognition();
    assert_eq!(
      recognition.process(&RgbImage::new(0, 0)).unwrap_err(),
      RecognitionError::EmptyFrame
    );
  }

  #[test]
  fn no_models_no_results() {
    let mut recognition = recognition().with_working_size(64, 48);
    let out = recognition.process(&RgbImage::new(128, 96)).unwrap();
    assert!(out.results.is_empty());
    assert!(out.errors.is_empty());
    assert!(out.into_result().unwrap().is_empty());
  }

  #[test]
  fn frame_size_change_clears_ira() {
    let mut recognition = recognition().with_working_size(64, 48);
    recognition
      .register_model(1, RgbImage::new(16, 16))
      .unwrap();
    recognition.process(&RgbImage::new(128, 96)).unwrap();

    let model = recognition.registry_mut().get_mut(1).unwrap();
    model.ira_mut().set(Rect::new(0, 0, 10, 10), 64, 48);
    recognition.process(&RgbImage::new(64, 64)).unwrap();
    assert!(!recognition.registry().get(1).unwrap().ira().is_set());
  }

  #[test]
  fn aggregate_error() {
    let recognition = Recognition {
      results: Vec::new(),
      errors: ErrorList::from(vec![MatchError::NoDevice]),
    };
    assert!(matches!(
      recognition.into_result(),
      Err(RecognitionError::Aggregate(list)) if list.len() == 1
    ));
  }

  #[test]
  fn result_scale() {
    let result = RecognitionResult {
      score: 100,
      model_id: 2,
      quad: Quad::from_size(10, 20),
    };
    let scaled = result.scale(1.5, 1.5);
    assert_eq!(scaled.quad.corners[2], Point::new(15.0, 30.0));
    assert_eq!(scaled.model_id, 2);
  }
}
