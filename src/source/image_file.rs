// 该文件是 Xunjing （寻景） 项目的一部分。
// src/source/image_file.rs - 图像文件输入
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

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  source::{Frame, FrameSource, SourceError},
};

/// 单张图像输入，可通过 `?repeat=N` 重复产出 N 次
pub struct ImageFileSource {
  image: RgbImage,
  remaining: AtomicU64,
  index: AtomicU64,
  finished: AtomicBool,
  start: Instant,
}

impl FromUrlWithScheme for ImageFileSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileSource {
  type Error = SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SourceError::SchemeMismatch(url.scheme().to_string()));
    }

    let repeat = match url.query_pairs().find(|(k, _)| k == "repeat") {
      Some((_, v)) => v
        .parse::<u64>()
        .map_err(|_| SourceError::InvalidSource(format!("repeat 参数无效: {}", v)))?,
      None => 1,
    };

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像文件: {} ({}x{}), 重复 {} 次",
      path,
      image.width(),
      image.height(),
      repeat
    );

    Ok(Self::new(image, repeat))
  }
}

impl ImageFileSource {
  pub fn new(image: RgbImage, repeat: u64) -> Self {
    Self {
      image,
      remaining: AtomicU64::new(repeat),
      index: AtomicU64::new(0),
      finished: AtomicBool::new(repeat == 0),
      start: Instant::now(),
    }
  }
}

impl FrameSource for ImageFileSource {
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError> {
    if self.is_finished() {
      return Ok(None);
    }

    let taken = self
      .remaining
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    match taken {
      Ok(previous) => {
        if previous == 1 {
          self.finished.store(true, Ordering::SeqCst);
        }
        Ok(Some(Frame {
          image: self.image.clone(),
          index: self.index.fetch_add(1, Ordering::SeqCst),
          timestamp_ms: self.start.elapsed().as_millis() as u64,
        }))
      }
      Err(_) => {
        self.finished.store(true, Ordering::SeqCst);
        Ok(None)
      }
    }
  }

  fn is_finished(&self) -> bool {
    self.finished.load(Ordering::SeqCst)
  }

  fn finish(&self) {
    self.finished.store(true, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeats_the_same_image() {
    let source = ImageFileSource::new(RgbImage::new(4, 4), 3);
    let mut indices = Vec::new();
    while !source.is_finished() {
      if let Some(frame) = source.obtain_image().unwrap() {
        indices.push(frame.index);
      }
    }
    assert_eq!(indices, vec![0, 1, 2]);
  }

  #[test]
  fn wrong_scheme() {
    let url = Url::parse("dir:///tmp").unwrap();
    assert!(matches!(
      ImageFileSource::from_url(&url),
      Err(SourceError::SchemeMismatch(_))
    ));
  }
}
