// 该文件是 Xunjing （寻景） 项目的一部分。
// src/matching.rs - 特征匹配算法与 IRA 状态机
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

//! # 单模型匹配
//!
//! 每次调用按以下状态执行：
//!
//! - `Cached`：模型的 IRA 有效，只在缓存区域内搜索；
//! - `Region`：调用方给出了候选区域，只在该区域内搜索；
//! - `Full`：整帧搜索；
//! - `Fallback`：受限搜索失败后，清空 IRA 并整帧重试一次。
//!
//! 受限搜索最多触发一次 `Fallback`，`Full` 与 `Fallback` 失败即终止。

use std::collections::HashMap;
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{Point, Quad, Rect};
use crate::model::{Ira, ObjectModel};
use crate::recognition::RecognitionResult;

mod backend;
mod fast_brief;
mod homography;

pub use self::backend::{Execution, FeatureBackend, Features, KnnMatch, Neighbour};
pub use self::fast_brief::FastBriefBackend;
pub use self::homography::Homography;

/// 二值判定下的匹配分数
pub const MATCH_SCORE: u8 = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
  #[error("图像未加载或为空")]
  ImageNotLoaded,
  #[error("区域 {region:?} 超出图像尺寸 {width}x{height}")]
  DimensionMismatch {
    region: Rect,
    width: u32,
    height: u32,
  },
  #[error("模型 {model_id} 的特征由 '{found}' 生成，当前算法需要 '{expected}'")]
  ModelMismatch {
    model_id: i32,
    expected: &'static str,
    found: &'static str,
  },
  #[error("没有可用的加速匹配设备")]
  NoDevice,
  #[error("特征后端错误: {0}")]
  Backend(String),
}

/// 匹配参数
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
  /// 比率测试阈值：最近距离必须小于次近距离乘以该值
  pub ratio: f32,
  /// 保留的最佳对应点数量上限
  pub max_matches: usize,
  /// 估计单应性所需的最少对应点
  pub min_matches: usize,
  /// 四边形每条边的最小像素长度
  pub min_side: f32,
}

impl Default for MatchingConfig {
  fn default() -> Self {
    Self {
      ratio: 0.75,
      max_matches: 100,
      min_matches: 4,
      min_side: 10.0,
    }
  }
}

impl MatchingConfig {
  pub fn validate(&self) -> Result<(), String> {
    if !(self.ratio > 0.0 && self.ratio <= 1.0) {
      return Err(format!("比率阈值必须在 (0, 1] 内: {}", self.ratio));
    }
    if self.min_matches < 4 {
      return Err(format!("至少需要 4 对对应点: {}", self.min_matches));
    }
    if self.max_matches < self.min_matches {
      return Err(format!(
        "最大匹配数 {} 小于最少匹配数 {}",
        self.max_matches, self.min_matches
      ));
    }
    if !(self.min_side >= 0.0) {
      return Err(format!("最小边长无效: {}", self.min_side));
    }
    Ok(())
  }
}

/// 一次匹配尝试所处的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
  Full,
  Cached(Rect),
  Region(Rect),
  Fallback,
}

impl SearchState {
  pub fn initial(ira: &Ira, hint: Option<Rect>) -> Self {
    match (ira.rect(), hint) {
      (Some(rect), _) => SearchState::Cached(rect),
      (None, Some(rect)) => SearchState::Region(rect),
      (None, None) => SearchState::Full,
    }
  }

  /// 搜索区域，None 表示整帧
  pub fn area(&self) -> Option<Rect> {
    match self {
      SearchState::Cached(rect) | SearchState::Region(rect) => Some(*rect),
      SearchState::Full | SearchState::Fallback => None,
    }
  }

  pub fn is_restricted(&self) -> bool {
    self.area().is_some()
  }
}

/// 一帧场景（工作分辨率），按区域缓存场景特征，供所有模型任务共享
pub struct SceneModel {
  image: RgbImage,
  gray: GrayImage,
  full: Mutex<Option<Arc<Features>>>,
  crops: Mutex<HashMap<Rect, Arc<Features>>>,
}

impl SceneModel {
  pub fn new(image: RgbImage) -> Self {
    let gray = image::imageops::grayscale(&image);
    Self {
      image,
      gray,
      full: Mutex::new(None),
      crops: Mutex::new(HashMap::new()),
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  /// 取得整帧或区域内的特征；区域特征的关键点已映射回整帧坐标
  pub fn features(
    &self,
    backend: &dyn FeatureBackend,
    area: Option<Rect>,
  ) -> Result<Arc<Features>, MatchError> {
    match area {
      None => {
        let mut full = self.full.lock();
        if let Some(features) = full.as_ref() {
          return Ok(features.clone());
        }
        let features = Arc::new(backend.detect_and_compute(&self.gray)?);
        *full = Some(features.clone());
        Ok(features)
      }
      Some(rect) => {
        if let Some(features) = self.crops.lock().get(&rect) {
          return Ok(features.clone());
        }
        let crop = image::imageops::crop_imm(
          &self.gray,
          rect.x as u32,
          rect.y as u32,
          rect.width as u32,
          rect.height as u32,
        )
        .to_image();
        let features = Arc::new(
          backend
            .detect_and_compute(&crop)?
            .offset(rect.x as f32, rect.y as f32),
        );
        Ok(self.crops.lock().entry(rect).or_insert(features).clone())
      }
    }
  }
}

/// 四边形须与场景相交，且角点不超出场景向四周各扩展一倍尺寸的范围
fn plausible_in_scene(quad: &Quad, width: u32, height: u32) -> bool {
  let (w, h) = (width as f32, height as f32);
  let near = quad
    .corners
    .iter()
    .all(|p| p.x >= -w && p.x <= 2.0 * w && p.y >= -h && p.y <= 2.0 * h);
  near && quad.bounding_rect().clamp_to(width, height).is_some()
}

/// 基于特征点与单应性的匹配算法
pub struct FeatureMatching {
  backend: Arc<dyn FeatureBackend>,
  config: MatchingConfig,
}

impl FeatureMatching {
  pub fn new(backend: Arc<dyn FeatureBackend>, config: MatchingConfig) -> Self {
    Self { backend, config }
  }

  pub fn backend(&self) -> &dyn FeatureBackend {
    self.backend.as_ref()
  }

  pub fn config(&self) -> &MatchingConfig {
    &self.config
  }

  pub fn execution(&self) -> Execution {
    self.backend.execution()
  }

  /// 预先计算模型特征；已有特征时不做任何事
  pub fn prepare(&self, model: &mut ObjectModel) -> Result<(), MatchError> {
    model.ensure_features(self.backend.as_ref()).map(|_| ())
  }

  /// 在场景中搜索一个模型，成功时更新该模型的 IRA
  pub fn match_model(
    &self,
    scene: &SceneModel,
    model: &mut ObjectModel,
    hint: Option<Rect>,
  ) -> Result<Option<RecognitionResult>, MatchError> {
    self.backend.check_device()?;
    if scene.is_empty() {
      return Err(MatchError::ImageNotLoaded);
    }
    if let Some(region) = hint
      && !region.fits_within(scene.width(), scene.height())
    {
      return Err(MatchError::DimensionMismatch {
        region,
        width: scene.width(),
        height: scene.height(),
      });
    }

    let model_features = model.ensure_features(self.backend.as_ref())?;
    if model_features.extractor != self.backend.name() {
      return Err(MatchError::ModelMismatch {
        model_id: model.id(),
        expected: self.backend.name(),
        found: model_features.extractor,
      });
    }

    let mut state = SearchState::initial(model.ira(), hint);
    if let SearchState::Cached(rect) = state
      && !rect.fits_within(scene.width(), scene.height())
    {
      debug!("模型 {} 的 IRA 超出场景，改为整帧搜索", model.id());
      model.ira_mut().clear();
      state = SearchState::initial(model.ira(), hint);
    }

    let outline = Quad::from_size(model.width(), model.height());
    let mut found = self.attempt(scene, &model_features, &outline, state)?;
    if found.is_none() && state.is_restricted() {
      debug!("模型 {} 在 {:?} 中未找到，清空 IRA 后整帧重试", model.id(), state);
      model.ira_mut().clear();
      state = SearchState::Fallback;
      found = self.attempt(scene, &model_features, &outline, state)?;
    }

    let Some(quad) = found else {
      debug!("模型 {} 未匹配 ({:?})", model.id(), state);
      return Ok(None);
    };

    model
      .ira_mut()
      .update_from_quad(&quad, scene.width(), scene.height());
    debug!(
      "模型 {} 匹配成功 ({:?})，IRA 更新为 {:?}",
      model.id(),
      state,
      model.ira()
    );

    Ok(Some(RecognitionResult {
      score: MATCH_SCORE,
      model_id: model.id(),
      quad,
    }))
  }

  /// 单次匹配尝试，返回场景坐标下通过校验的四边形
  fn attempt(
    &self,
    scene: &SceneModel,
    model_features: &Features,
    outline: &Quad,
    state: SearchState,
  ) -> Result<Option<Quad>, MatchError> {
    if model_features.is_empty() {
      return Ok(None);
    }
    let scene_features = scene.features(self.backend.as_ref(), state.area())?;
    if scene_features.is_empty() {
      return Ok(None);
    }

    let knn = self.backend.knn_match(model_features, &scene_features);
    let good = self.select_matches(knn);
    if good.len() < self.config.min_matches {
      debug!("对应点不足: {} < {}", good.len(), self.config.min_matches);
      return Ok(None);
    }

    let (src, dst): (Vec<Point>, Vec<Point>) = good
      .iter()
      .filter_map(|m| {
        Some((
          *model_features.keypoints.get(m.query)?,
          *scene_features.keypoints.get(m.best.train)?,
        ))
      })
      .unzip();

    let Some(homography) = self.backend.estimate_homography(&src, &dst) else {
      return Ok(None);
    };
    let Some(quad) = homography.project_quad(outline) else {
      return Ok(None);
    };
    if !quad.is_finite() || quad.min_side() < self.config.min_side {
      debug!("四边形过小或无效，视为误匹配: {:?}", quad);
      return Ok(None);
    }
    if !quad.is_convex() || !plausible_in_scene(&quad, scene.width(), scene.height()) {
      debug!("单应性退化，四边形不可信: {:?}", quad);
      return Ok(None);
    }
    Ok(Some(quad))
  }

  /// 比率测试后按距离插入排序，最多保留 `max_matches` 个
  fn select_matches(&self, knn: Vec<KnnMatch>) -> Vec<KnnMatch> {
    let mut best: Vec<KnnMatch> = Vec::with_capacity(self.config.max_matches);
    for m in knn {
      let Some(second) = m.second else {
        continue;
      };
      if m.best.distance >= self.config.ratio * second.distance {
        continue;
      }
      let position = best.partition_point(|b| b.best.distance <= m.best.distance);
      if position >= self.config.max_matches {
        continue;
      }
      best.insert(position, m);
      best.truncate(self.config.max_matches);
    }
    best
  }
}
