// 该文件是 Xunjing （寻景） 项目的一部分。
// tests/fast_brief.rs - 默认特征后端的端到端测试
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

use image::{Rgb, RgbImage};

use xunjing::geometry::Point;
use xunjing::matching::{FastBriefBackend, FeatureMatching, MatchingConfig};
use xunjing::recognition::MatchRecognition;

/// 随机灰度方块组成的纹理
fn blocks(width: u32, height: u32, block: u32, mut seed: u64) -> RgbImage {
  let cols = width.div_ceil(block);
  let rows = height.div_ceil(block);
  let values: Vec<u8> = (0..cols * rows)
    .map(|_| {
      seed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
      (seed >> 56) as u8
    })
    .collect();
  RgbImage::from_fn(width, height, |x, y| {
    let v = values[((y / block) * cols + x / block) as usize];
    Rgb([v, v, v])
  })
}

fn scene_with(object: &RgbImage, x: u32, y: u32) -> RgbImage {
  let mut scene = RgbImage::from_pixel(320, 240, Rgb([128, 128, 128]));
  image::imageops::replace(&mut scene, object, x as i64, y as i64);
  scene
}

#[test]
fn finds_pasted_object_and_tracks_it() {
  let object = blocks(96, 96, 8, 11);
  let mut recognition = MatchRecognition::new(FeatureMatching::new(
    Arc::new(FastBriefBackend::new()),
    MatchingConfig::default(),
  ))
  .with_working_size(320, 240);
  recognition.register_model(7, object.clone()).unwrap();

  let output = recognition.process(&scene_with(&object, 100, 60)).unwrap();
  assert!(output.errors.is_empty());
  assert_eq!(output.results.len(), 1);
  let quad = output.results[0].quad;
  assert!(quad.corners[0].distance(&Point::new(100.0, 60.0)) < 2.0);
  assert!(quad.corners[2].distance(&Point::new(196.0, 156.0)) < 2.0);
  assert!(recognition.registry().get(7).unwrap().ira().is_set());

  // 第二帧在 IRA 内小幅移动
  let output = recognition.process(&scene_with(&object, 110, 66)).unwrap();
  assert_eq!(output.results.len(), 1);
  assert!(output.results[0].quad.corners[0].distance(&Point::new(110.0, 66.0)) < 2.0);
}

#[test]
fn flat_scene_has_no_result() {
  let object = blocks(96, 96, 8, 23);
  let mut recognition = MatchRecognition::new(FeatureMatching::new(
    Arc::new(FastBriefBackend::new()),
    MatchingConfig::default(),
  ))
  .with_working_size(320, 240);
  recognition.register_model(1, object).unwrap();

  let flat = RgbImage::from_pixel(320, 240, Rgb([128, 128, 128]));
  let output = recognition.process(&flat).unwrap();
  assert!(output.results.is_empty());
  assert!(output.errors.is_empty());
  assert!(!recognition.registry().get(1).unwrap().ira().is_set());
}
