// 该文件是 Xunjing （寻景） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::frame::FrameBuffer;
use crate::output::{Render, draw::Draw};
use crate::recognition::RecognitionResult;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 记录方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
  /// 保存绘制了四边形的图像
  Draw,
  /// 保存原始图像，结果写入同名 JSON 文件
  Record,
}

/// 按日期分目录保存帧：`<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.png`
///
/// 默认只保存有结果的帧，URL 中带 `always` 时保存全部帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  draw: Draw,
  counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mode = if uri.query_pairs().any(|(k, _)| k == "record") {
      RecordMode::Record
    } else {
      RecordMode::Draw
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(uri.path(), mode, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, mode: RecordMode, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      mode,
      draw: Draw::default(),
      counter: Mutex::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self.counter.lock();
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    &self,
    path: &Path,
    frame: &FrameBuffer,
    result: &[RecognitionResult],
  ) -> Result<(), DirectoryRecordOutputError> {
    let items: Vec<_> = result
      .iter()
      .map(|item| {
        json!({
          "model_id": item.model_id,
          "score": item.score,
          "quad": item.quad.corners.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
        })
      })
      .collect();
    let record = json!({
      "image": path.file_name().map(|n| n.to_string_lossy().into_owned()),
      "width": frame.width(),
      "height": frame.height(),
      "results": items,
    });

    let writer = BufWriter::new(File::create(path.with_extension("json"))?);
    serde_json::to_writer_pretty(writer, &record)?;
    Ok(())
  }
}

impl Render<FrameBuffer, [RecognitionResult]> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &FrameBuffer,
    result: &[RecognitionResult],
  ) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    match self.mode {
      RecordMode::Draw => self.draw.draw_on(frame, result).save(&path)?,
      RecordMode::Record => {
        frame.to_rgb_image().save(&path)?;
        self.write_record(&path, frame, result)?;
      }
    }
    debug!("保存帧记录: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ColorFormat;
  use crate::geometry::Quad;
  use image::RgbImage;

  fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          pending.push(path);
        } else if path.extension().is_some_and(|e| e == extension) {
          found.push(path);
        }
      }
    }
    found
  }

  #[test]
  fn parses_url_options() {
    let output =
      DirectoryRecordOutput::from_url(&url::Url::parse("folder:///data/rec?always&record").unwrap())
        .unwrap();
    assert_eq!(output.directory, PathBuf::from("/data/rec"));
    assert_eq!(output.mode, RecordMode::Record);
    assert!(output.always);
  }

  #[test]
  fn records_only_frames_with_results() {
    let dir = std::env::temp_dir().join(format!("xunjing-record-{}", std::process::id()));
    let output = DirectoryRecordOutput::new(&dir, RecordMode::Record, false);
    let frame = FrameBuffer::convert(&RgbImage::new(16, 16), ColorFormat::Rgb);

    output.render_result(&frame, &[]).unwrap();
    assert!(!dir.exists() || files_with_extension(&dir, "png").is_empty());

    let result = RecognitionResult {
      score: 100,
      model_id: 9,
      quad: Quad::from_size(8, 8),
    };
    output.render_result(&frame, &[result]).unwrap();
    let images = files_with_extension(&dir, "png");
    assert_eq!(images.len(), 1);

    let text = std::fs::read_to_string(images[0].with_extension("json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(record["results"][0]["model_id"], 9);
    assert_eq!(record["width"], 16);
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
