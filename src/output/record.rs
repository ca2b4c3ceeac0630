// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 文本记录输出
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectResult},
  output::{LabelMode, Render, ensure_parent_dir},
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每个检测结果一行: `标签, 得分, x1, y1, x2, y2`
pub struct RecordOutput {
  path: PathBuf,
  label: LabelMode,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch);
    }

    Ok(RecordOutput {
      path: PathBuf::from(uri.path()),
      label: LabelMode::from_url(uri),
    })
  }
}

impl RecordOutput {
  pub fn format(&self, result: &DetectResult) -> String {
    result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          self.label.label(item.class_id),
          item.score,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }
}

impl RecordOutput {
  /// 分类结果每行 `类别编号, 概率`
  pub fn format_classes(result: &ClassifyResult) -> String {
    result
      .items
      .iter()
      .map(|item| format!("{}, {:.6}", item.class_id, item.prob))
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn write(&self, content: String) -> Result<(), RecordOutputError> {
    ensure_parent_dir(&self.path)?;
    std::fs::write(&self.path, content)?;
    warn!("保存检测记录到文件: {}", self.path.display());
    Ok(())
  }
}

impl<F> Render<F, ClassifyResult> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, _frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    self.write(Self::format_classes(result))
  }
}

impl<F> Render<F, DetectResult> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    self.write(self.format(result))
  }
}
