// 该文件是 Xunjing （寻景） 项目的一部分。
// tests/common/mod.rs - 集成测试用的脚本化特征后端
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

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use image::GrayImage;
use parking_lot::Mutex;

use xunjing::geometry::Point;
use xunjing::matching::{
  Execution, FeatureBackend, Features, Homography, KnnMatch, MatchError, Neighbour,
};

pub const MODEL_SIZE: u32 = 50;
/// 参考图像宽度为该值的模型计算特征时总是失败
pub const FAILING_WIDTH: u32 = 13;

pub const NAME: &str = "scripted";

/// 模型上的六个非共线特征点
pub fn model_points() -> Vec<Point> {
  (0..6)
    .map(|i| Point::new(5.0 + (i % 3) as f32 * 20.0, 5.0 + (i / 3) as f32 * 20.0))
    .collect()
}

fn features(points: &[Point]) -> Features {
  let mut features = Features::new(NAME);
  for (i, p) in points.iter().enumerate() {
    features.push(*p, Box::new([i as u8]));
  }
  features
}

/// 按图像尺寸区分模型、整帧与裁剪区域的后端
///
/// 整帧特征由测试通过 `set_scene` 指定（工作分辨率坐标）。裁剪区域按尺寸查找
/// `set_crop` 给出的特征（区域内坐标），未指定的裁剪区域没有特征。
pub struct ScriptedBackend {
  scene_size: (u32, u32),
  scene: Mutex<Vec<Point>>,
  crops: Mutex<Vec<((u32, u32), Vec<Point>)>>,
  execution: Execution,
  pub full_calls: AtomicUsize,
  pub crop_calls: AtomicUsize,
  pub knn_calls: AtomicUsize,
  active: AtomicUsize,
  pub max_active: AtomicUsize,
}

impl ScriptedBackend {
  pub fn new(scene_size: (u32, u32)) -> Self {
    Self {
      scene_size,
      scene: Mutex::new(Vec::new()),
      crops: Mutex::new(Vec::new()),
      execution: Execution::Pooled,
      full_calls: AtomicUsize::new(0),
      crop_calls: AtomicUsize::new(0),
      knn_calls: AtomicUsize::new(0),
      active: AtomicUsize::new(0),
      max_active: AtomicUsize::new(0),
    }
  }

  pub fn single_context(mut self) -> Self {
    self.execution = Execution::SingleContext;
    self
  }

  /// 把模型特征点经 `map` 变换后放入整帧
  pub fn set_scene(&self, map: impl Fn(Point) -> Point) {
    *self.scene.lock() = model_points().into_iter().map(map).collect();
  }

  /// 尺寸为 `size` 的裁剪区域内放入经 `map` 变换的模型特征点
  pub fn set_crop(&self, size: (u32, u32), map: impl Fn(Point) -> Point) {
    let points = model_points().into_iter().map(map).collect();
    self.crops.lock().push((size, points));
  }

  pub fn clear_scene(&self) {
    self.scene.lock().clear();
  }
}

impl FeatureBackend for ScriptedBackend {
  fn name(&self) -> &'static str {
    NAME
  }

  fn execution(&self) -> Execution {
    self.execution
  }

  fn detect_and_compute(&self, image: &GrayImage) -> Result<Features, MatchError> {
    let size = image.dimensions();
    if size.0 == FAILING_WIDTH {
      return Err(MatchError::Backend("脚本化失败".to_string()));
    }
    if size == (MODEL_SIZE, MODEL_SIZE) {
      return Ok(features(&model_points()));
    }
    if size == self.scene_size {
      self.full_calls.fetch_add(1, Ordering::SeqCst);
      return Ok(features(&self.scene.lock()));
    }
    self.crop_calls.fetch_add(1, Ordering::SeqCst);
    let crops = self.crops.lock();
    match crops.iter().find(|(crop, _)| *crop == size) {
      Some((_, points)) => Ok(features(points)),
      None => Ok(Features::new(NAME)),
    }
  }

  fn knn_match(&self, query: &Features, train: &Features) -> Vec<KnnMatch> {
    self.knn_calls.fetch_add(1, Ordering::SeqCst);
    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(active, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(5));

    let matches = query
      .descriptors
      .iter()
      .enumerate()
      .filter_map(|(q, d)| {
        let t = train.descriptors.iter().position(|c| c == d)?;
        Some(KnnMatch {
          query: q,
          best: Neighbour {
            train: t,
            distance: 0.0,
          },
          second: Some(Neighbour {
            train: t,
            distance: 64.0,
          }),
        })
      })
      .collect();

    self.active.fetch_sub(1, Ordering::SeqCst);
    matches
  }

  fn estimate_homography(&self, src: &[Point], dst: &[Point]) -> Option<Homography> {
    Homography::fit(src, dst)
  }
}
