// 该文件是 Xunjing （寻景） 项目的一部分。
// src/source/directory.rs - 图像目录输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use image::ImageReader;
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  source::{Frame, FrameSource, SourceError},
};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 按文件名顺序读取目录中的全部图像
pub struct DirectorySource {
  paths: Mutex<VecDeque<PathBuf>>,
  index: AtomicU64,
  finished: AtomicBool,
  start: Instant,
}

impl FromUrlWithScheme for DirectorySource {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for DirectorySource {
  type Error = SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SourceError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl DirectorySource {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, SourceError> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
      return Err(SourceError::InvalidSource(format!(
        "不是目录: {}",
        directory.display()
      )));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        paths.push(path);
      }
    }
    paths.sort();
    info!("目录 {} 中找到 {} 张图像", directory.display(), paths.len());

    let finished = paths.is_empty();
    Ok(Self {
      paths: Mutex::new(paths.into()),
      index: AtomicU64::new(0),
      finished: AtomicBool::new(finished),
      start: Instant::now(),
    })
  }
}

impl FrameSource for DirectorySource {
  fn obtain_image(&self) -> Result<Option<Frame>, SourceError> {
    if self.is_finished() {
      return Ok(None);
    }

    let path = {
      let mut paths = self.paths.lock();
      let path = paths.pop_front();
      if paths.is_empty() {
        self.finished.store(true, Ordering::SeqCst);
      }
      path
    };

    let Some(path) = path else {
      return Ok(None);
    };

    debug!("读取图像: {}", path.display());
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    Ok(Some(Frame {
      image,
      index: self.index.fetch_add(1, Ordering::SeqCst),
      timestamp_ms: self.start.elapsed().as_millis() as u64,
    }))
  }

  fn is_finished(&self) -> bool {
    self.finished.load(Ordering::SeqCst)
  }

  fn finish(&self) {
    self.finished.store(true, Ordering::SeqCst);
  }
}
