// 该文件是 Xunjing （寻景） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use url::Url;

use crate::frame::FrameBuffer;
use crate::output::{OutputError, Render};
use crate::recognition::RecognitionResult;
use crate::{FromUrl, FromUrlWithScheme};

/// 只把结果写入日志
#[derive(Debug, Default)]
pub struct LogOutput {
  frames: AtomicU64,
  /// 没有结果的帧也记录
  verbose: bool,
}

impl LogOutput {
  pub fn new(verbose: bool) -> Self {
    Self {
      frames: AtomicU64::new(0),
      verbose,
    }
  }

  pub fn frames(&self) -> u64 {
    self.frames.load(Ordering::Relaxed)
  }
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    let verbose = url.query_pairs().any(|(k, _)| k == "verbose");
    Ok(Self::new(verbose))
  }
}

impl Render<FrameBuffer, [RecognitionResult]> for LogOutput {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &FrameBuffer,
    result: &[RecognitionResult],
  ) -> Result<(), Self::Error> {
    let index = self.frames.fetch_add(1, Ordering::Relaxed);
    if result.is_empty() {
      if self.verbose {
        info!("帧 {} ({}x{}): 未找到目标", index, frame.width(), frame.height());
      }
      return Ok(());
    }

    info!(
      "帧 {} ({}x{}): 找到 {} 个目标",
      index,
      frame.width(),
      frame.height(),
      result.len()
    );
    for item in result {
      let c = &item.quad.corners;
      info!(
        "  - 模型 {} ({}): ({:.0}, {:.0}) ({:.0}, {:.0}) ({:.0}, {:.0}) ({:.0}, {:.0})",
        item.model_id, item.score, c[0].x, c[0].y, c[1].x, c[1].y, c[2].x, c[2].y, c[3].x, c[3].y
      );
    }
    Ok(())
  }
}
