// 该文件是 Xunjing （寻景） 项目的一部分。
// src/matching/backend.rs - 特征后端接口
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

use image::GrayImage;

use crate::geometry::Point;
use crate::matching::{Homography, MatchError};

/// 一组关键点及其描述子，`keypoints[i]` 对应 `descriptors[i]`
#[derive(Debug, Clone, Default)]
pub struct Features {
  pub keypoints: Vec<Point>,
  pub descriptors: Vec<Box<[u8]>>,
  /// 生成这些特征的后端名称
  pub extractor: &'static str,
}

impl Features {
  pub fn new(extractor: &'static str) -> Self {
    Self {
      keypoints: Vec::new(),
      descriptors: Vec::new(),
      extractor,
    }
  }

  pub fn push(&mut self, keypoint: Point, descriptor: Box<[u8]>) {
    self.keypoints.push(keypoint);
    self.descriptors.push(descriptor);
  }

  pub fn len(&self) -> usize {
    self.keypoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keypoints.is_empty()
  }

  /// 平移全部关键点，用于把裁剪区域的结果映射回整帧坐标
  pub fn offset(mut self, dx: f32, dy: f32) -> Self {
    for p in self.keypoints.iter_mut() {
      *p = p.offset(dx, dy);
    }
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
  /// 在被匹配特征集中的下标
  pub train: usize,
  pub distance: f32,
}

/// 一个查询描述子的两个最近邻
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnMatch {
  pub query: usize,
  pub best: Neighbour,
  pub second: Option<Neighbour>,
}

/// 后端的执行约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
  /// 可在线程池中并发调用
  #[default]
  Pooled,
  /// 只有一个加速器上下文，所有模型必须顺序匹配
  SingleContext,
}

/// 特征检测、描述、匹配与单应性估计能力
pub trait FeatureBackend: Send + Sync {
  fn name(&self) -> &'static str;

  fn execution(&self) -> Execution {
    Execution::Pooled
  }

  /// 需要加速设备的后端在设备不可用时返回 `MatchError::NoDevice`
  fn check_device(&self) -> Result<(), MatchError> {
    Ok(())
  }

  fn detect_and_compute(&self, image: &GrayImage) -> Result<Features, MatchError>;

  /// 为 `query` 中每个描述子找出 `train` 中最近的两个
  fn knn_match(&self, query: &Features, train: &Features) -> Vec<KnnMatch>;

  /// 稳健估计 `src -> dst` 的单应性，失败时返回 None
  fn estimate_homography(&self, src: &[Point], dst: &[Point]) -> Option<Homography>;
}
