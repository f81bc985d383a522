// 该文件是 Xunjing （寻景） 项目的一部分。
// src/matching/fast_brief.rs - FAST 角点 + BRIEF 描述子后端
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
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::geometry::Point;
use crate::matching::{FeatureBackend, Features, Homography, KnnMatch, MatchError, Neighbour};

const FAST_BRIEF_NAME: &str = "fast-brief";

// 描述子采样半径，关键点离边缘至少这么远
const PATCH_RADIUS: i32 = 12;
const DESCRIPTOR_BYTES: usize = 32;
const PAIR_SEED: u64 = 0x9E37_79B9_7F4A_7C15;
const RANSAC_SEED: u64 = 0x2545_F491_4F6C_DD1D;

const DEFAULT_FAST_THRESHOLD: u8 = 20;
const DEFAULT_MAX_KEYPOINTS: usize = 1000;
const DEFAULT_BLUR_SIGMA: f32 = 1.2;
const DEFAULT_RANSAC_THRESHOLD: f32 = 3.0;
const DEFAULT_RANSAC_ITERATIONS: usize = 500;

type TestPair = ((i32, i32), (i32, i32));

/// 纯 CPU 的默认特征后端
pub struct FastBriefBackend {
  fast_threshold: u8,
  max_keypoints: usize,
  blur_sigma: f32,
  ransac_threshold: f32,
  ransac_iterations: usize,
  pairs: Vec<TestPair>,
}

impl Default for FastBriefBackend {
  fn default() -> Self {
    let mut rng = StdRng::seed_from_u64(PAIR_SEED);
    let mut offset = || rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS);
    let pairs = (0..DESCRIPTOR_BYTES * 8)
      .map(|_| ((offset(), offset()), (offset(), offset())))
      .collect();

    Self {
      fast_threshold: DEFAULT_FAST_THRESHOLD,
      max_keypoints: DEFAULT_MAX_KEYPOINTS,
      blur_sigma: DEFAULT_BLUR_SIGMA,
      ransac_threshold: DEFAULT_RANSAC_THRESHOLD,
      ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
      pairs,
    }
  }
}

impl FastBriefBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
    self.fast_threshold = threshold;
    self
  }

  pub fn with_max_keypoints(mut self, max_keypoints: usize) -> Self {
    self.max_keypoints = max_keypoints;
    self
  }

  pub fn with_ransac(mut self, threshold: f32, iterations: usize) -> Self {
    self.ransac_threshold = threshold;
    self.ransac_iterations = iterations;
    self
  }

  fn describe(&self, smoothed: &GrayImage, x: i32, y: i32) -> Box<[u8]> {
    let sample = |dx: i32, dy: i32| smoothed.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
    let mut bytes = [0u8; DESCRIPTOR_BYTES];
    for (bit, ((ax, ay), (bx, by))) in self.pairs.iter().enumerate() {
      if sample(*ax, *ay) < sample(*bx, *by) {
        bytes[bit / 8] |= 1 << (bit % 8);
      }
    }
    Box::new(bytes)
  }
}

fn hamming(a: &[u8], b: &[u8]) -> u32 {
  if a.len() != b.len() {
    return u32::MAX;
  }
  a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

impl FeatureBackend for FastBriefBackend {
  fn name(&self) -> &'static str {
    FAST_BRIEF_NAME
  }

  fn detect_and_compute(&self, image: &GrayImage) -> Result<Features, MatchError> {
    let (width, height) = (image.width() as i32, image.height() as i32);
    if width == 0 || height == 0 {
      return Err(MatchError::ImageNotLoaded);
    }

    let mut features = Features::new(FAST_BRIEF_NAME);
    if width <= 2 * PATCH_RADIUS || height <= 2 * PATCH_RADIUS {
      return Ok(features);
    }

    let mut corners = corners_fast9(image, self.fast_threshold);
    corners.retain(|c| {
      let (x, y) = (c.x as i32, c.y as i32);
      x >= PATCH_RADIUS && y >= PATCH_RADIUS && x < width - PATCH_RADIUS && y < height - PATCH_RADIUS
    });
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(self.max_keypoints);

    let smoothed = if self.blur_sigma > 0.0 {
      gaussian_blur_f32(image, self.blur_sigma)
    } else {
      image.clone()
    };

    for corner in corners {
      let descriptor = self.describe(&smoothed, corner.x as i32, corner.y as i32);
      features.push(Point::new(corner.x as f32, corner.y as f32), descriptor);
    }
    Ok(features)
  }

  fn knn_match(&self, query: &Features, train: &Features) -> Vec<KnnMatch> {
    if train.is_empty() {
      return Vec::new();
    }

    query
      .descriptors
      .iter()
      .enumerate()
      .map(|(q, descriptor)| {
        let mut best = Neighbour {
          train: 0,
          distance: f32::INFINITY,
        };
        let mut second: Option<Neighbour> = None;
        for (t, candidate) in train.descriptors.iter().enumerate() {
          let distance = hamming(descriptor, candidate) as f32;
          if distance < best.distance {
            if best.distance.is_finite() {
              second = Some(best);
            }
            best = Neighbour { train: t, distance };
          } else if second.is_none_or(|s| distance < s.distance) {
            second = Some(Neighbour { train: t, distance });
          }
        }
        KnnMatch {
          query: q,
          best,
          second,
        }
      })
      .collect()
  }

  fn estimate_homography(&self, src: &[Point], dst: &[Point]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
      return None;
    }
    if src.len() == 4 {
      return Homography::fit(src, dst);
    }

    let n = src.len();
    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let mut best_inliers: Vec<usize> = Vec::new();

    for _ in 0..self.ransac_iterations {
      let sample = index::sample(&mut rng, n, 4);
      let sample_src: Vec<Point> = sample.iter().map(|i| src[i]).collect();
      let sample_dst: Vec<Point> = sample.iter().map(|i| dst[i]).collect();
      let Some(h) = Homography::fit(&sample_src, &sample_dst) else {
        continue;
      };

      let inliers: Vec<usize> = (0..n)
        .filter(|&i| {
          h.project(src[i])
            .is_some_and(|p| p.distance(&dst[i]) < self.ransac_threshold)
        })
        .collect();
      if inliers.len() > best_inliers.len() {
        best_inliers = inliers;
        if best_inliers.len() == n {
          break;
        }
      }
    }

    debug!("RANSAC 内点: {} / {}", best_inliers.len(), n);
    if best_inliers.len() < 4 {
      return None;
    }

    let inlier_src: Vec<_> = best_inliers.iter().map(|&i| src[i]).collect();
    let inlier_dst: Vec<_> = best_inliers.iter().map(|&i| dst[i]).collect();
    Homography::fit(&inlier_src, &inlier_dst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  fn blocks(width: u32, height: u32, block: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = width.div_ceil(block);
    let rows = height.div_ceil(block);
    let values: Vec<u8> = (0..cols * rows).map(|_| rng.r#gen::<u8>()).collect();
    GrayImage::from_fn(width, height, |x, y| {
      Luma([values[((y / block) * cols + x / block) as usize]])
    })
  }

  #[test]
  fn hamming_distance() {
    assert_eq!(hamming(&[0b1010, 0xFF], &[0b0011, 0x0F]), 2 + 4);
    assert_eq!(hamming(&[1], &[1, 2]), u32::MAX);
  }

  #[test]
  fn empty_image_is_not_loaded() {
    let backend = FastBriefBackend::new();
    assert!(matches!(
      backend.detect_and_compute(&GrayImage::new(0, 0)),
      Err(MatchError::ImageNotLoaded)
    ));
  }

  #[test]
  fn tiny_image_has_no_features() {
    let backend = FastBriefBackend::new();
    let features = backend.detect_and_compute(&GrayImage::new(10, 10)).unwrap();
    assert!(features.is_empty());
  }

  #[test]
  fn identical_images_match_themselves() {
    let backend = FastBriefBackend::new();
    let image = blocks(96, 96, 6, 7);
    let features = backend.detect_and_compute(&image).unwrap();
    assert!(features.len() >= 4);

    let matches = backend.knn_match(&features, &features);
    assert_eq!(matches.len(), features.len());
    assert!(matches.iter().all(|m| m.best.distance == 0.0));
  }

  #[test]
  fn ransac_ignores_outliers() {
    let backend = FastBriefBackend::new();
    let mut src = Vec::new();
    let mut dst = Vec::new();
    for i in 0..20 {
      let p = Point::new((i % 5) as f32 * 20.0, (i / 5) as f32 * 15.0);
      src.push(p);
      dst.push(p.offset(30.0, -10.0));
    }
    src.push(Point::new(5.0, 5.0));
    dst.push(Point::new(400.0, 300.0));
    src.push(Point::new(50.0, 10.0));
    dst.push(Point::new(-80.0, 90.0));

    let h = backend.estimate_homography(&src, &dst).unwrap();
    let p = h.project(Point::new(10.0, 10.0)).unwrap();
    assert!(p.distance(&Point::new(40.0, 0.0)) < 0.1);
  }
}
