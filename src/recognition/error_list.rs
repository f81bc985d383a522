// 该文件是 Xunjing （寻景） 项目的一部分。
// src/recognition/error_list.rs - 多任务错误汇总
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

use std::fmt;

use parking_lot::Mutex;

use crate::matching::MatchError;

/// 按收集顺序排列的匹配错误
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorList(Vec<MatchError>);

impl ErrorList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, error: MatchError) {
    self.0.push(error);
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, MatchError> {
    self.0.iter()
  }
}

impl fmt::Display for ErrorList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} 个错误", self.0.len())?;
    for (i, error) in self.0.iter().enumerate() {
      write!(f, "{}{}", if i == 0 { ": " } else { "; " }, error)?;
    }
    Ok(())
  }
}

impl IntoIterator for ErrorList {
  type Item = MatchError;
  type IntoIter = std::vec::IntoIter<MatchError>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

impl From<Vec<MatchError>> for ErrorList {
  fn from(errors: Vec<MatchError>) -> Self {
    Self(errors)
  }
}

/// 并行任务共享的错误收集器
#[derive(Debug, Default)]
pub struct ErrorCollector {
  errors: Mutex<Vec<MatchError>>,
}

impl ErrorCollector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, error: MatchError) {
    self.errors.lock().push(error);
  }

  pub fn into_list(self) -> ErrorList {
    ErrorList(self.errors.into_inner())
  }
}
