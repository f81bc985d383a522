// 该文件是 Xunjing （寻景） 项目的一部分。
// src/model.rs - 参考目标模型与注册表
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

use image::{GrayImage, RgbImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::matching::{FeatureBackend, Features, MatchError};

mod ira;
pub use self::ira::Ira;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型 {0} 的参考图像为空")]
  EmptyImage(i32),
  #[error("模型不存在: {0}")]
  NotFound(i32),
}

/// 待搜索的参考目标
#[derive(Debug, Clone)]
pub struct ObjectModel {
  id: i32,
  image: RgbImage,
  gray: GrayImage,
  features: Option<Arc<Features>>,
  ira: Ira,
}

impl ObjectModel {
  pub fn new(id: i32, image: RgbImage) -> Result<Self, ModelError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(ModelError::EmptyImage(id));
    }
    let gray = image::imageops::grayscale(&image);
    Ok(Self {
      id,
      image,
      gray,
      features: None,
      ira: Ira::Unset,
    })
  }

  /// 使用预先计算的特征，之后不再重新计算
  pub fn with_features(mut self, features: Features) -> Self {
    self.features = Some(Arc::new(features));
    self
  }

  pub fn id(&self) -> i32 {
    self.id
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn gray(&self) -> &GrayImage {
    &self.gray
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn features(&self) -> Option<&Arc<Features>> {
    self.features.as_ref()
  }

  /// 取得特征，首次调用时计算并缓存
  pub fn ensure_features(
    &mut self,
    backend: &dyn FeatureBackend,
  ) -> Result<Arc<Features>, MatchError> {
    if let Some(features) = &self.features {
      return Ok(features.clone());
    }

    let features = Arc::new(backend.detect_and_compute(&self.gray)?);
    debug!(
      "模型 {} 计算特征完成: {} 个关键点",
      self.id,
      features.len()
    );
    self.features = Some(features.clone());
    Ok(features)
  }

  pub fn ira(&self) -> &Ira {
    &self.ira
  }

  pub fn ira_mut(&mut self) -> &mut Ira {
    &mut self.ira
  }
}

/// 参考目标注册表
///
/// 每个模型（包括它的 IRA）只由负责它的匹配任务修改。
#[derive(Debug, Default)]
pub struct ModelRegistry {
  models: Vec<ObjectModel>,
}

impl ModelRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 注册参考图像；空图像会被拒绝
  pub fn register(&mut self, id: i32, image: RgbImage) -> Result<&mut ObjectModel, ModelError> {
    let model = ObjectModel::new(id, image)?;
    info!(
      "注册模型 {}: {}x{}",
      id,
      model.width(),
      model.height()
    );
    Ok(self.insert(model))
  }

  pub fn insert(&mut self, model: ObjectModel) -> &mut ObjectModel {
    self.models.push(model);
    let last = self.models.len() - 1;
    &mut self.models[last]
  }

  /// 移除第一个具有该标识的模型
  pub fn remove(&mut self, id: i32) -> Result<ObjectModel, ModelError> {
    let position = self
      .models
      .iter()
      .position(|m| m.id == id)
      .ok_or(ModelError::NotFound(id))?;
    Ok(self.models.remove(position))
  }

  pub fn clear(&mut self) {
    self.models.clear();
  }

  pub fn get(&self, id: i32) -> Option<&ObjectModel> {
    self.models.iter().find(|m| m.id == id)
  }

  pub fn get_mut(&mut self, id: i32) -> Option<&mut ObjectModel> {
    self.models.iter_mut().find(|m| m.id == id)
  }

  pub fn len(&self) -> usize {
    self.models.len()
  }

  pub fn is_empty(&self) -> bool {
    self.models.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ObjectModel> {
    self.models.iter()
  }

  pub fn models_mut(&mut self) -> &mut [ObjectModel] {
    &mut self.models
  }

  /// 清空全部模型的 IRA
  pub fn clear_ira(&mut self) {
    for model in self.models.iter_mut() {
      model.ira.clear();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Rect;

  #[test]
  fn empty_image_is_rejected() {
    let mut registry = ModelRegistry::new();
    assert!(matches!(
      registry.register(1, RgbImage::new(0, 0)),
      Err(ModelError::EmptyImage(1))
    ));
    assert!(registry.is_empty());
  }

  #[test]
  fn non_empty_image_gets_supplied_id() {
    let mut registry = ModelRegistry::new();
    registry.register(42, RgbImage::new(8, 8)).unwrap();
    registry.register(42, RgbImage::new(4, 4)).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(42).unwrap().width(), 8);
  }

  #[test]
  fn remove_and_clear() {
    let mut registry = ModelRegistry::new();
    registry.register(1, RgbImage::new(8, 8)).unwrap();
    registry.register(2, RgbImage::new(8, 8)).unwrap();
    assert_eq!(registry.remove(1).unwrap().id(), 1);
    assert!(matches!(registry.remove(1), Err(ModelError::NotFound(1))));
    registry.clear();
    assert!(registry.is_empty());
  }

  #[test]
  fn clear_ira_resets_every_model() {
    let mut registry = ModelRegistry::new();
    for id in 0..3 {
      let model = registry.register(id, RgbImage::new(8, 8)).unwrap();
      model.ira_mut().set(Rect::new(0, 0, 5, 5), 100, 100);
    }
    registry.clear_ira();
    assert!(registry.iter().all(|m| !m.ira().is_set()));
  }
}
