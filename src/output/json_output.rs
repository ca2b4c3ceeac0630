// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_output.rs - JSON 输出检测结果
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

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectItem, DetectResult, coco_label},
  output::{Render, ensure_parent_dir},
};

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonItem<'a> {
  label: Option<&'static str>,
  #[serde(flatten)]
  item: &'a DetectItem,
}

pub struct JsonOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonOutput {
  type Error = JsonOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch);
    }

    Ok(JsonOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl JsonOutput {
  pub fn to_json(result: &DetectResult) -> Result<String, serde_json::Error> {
    let items = result
      .items
      .iter()
      .map(|item| JsonItem {
        label: coco_label(item.class_id),
        item,
      })
      .collect::<Vec<_>>();
    serde_json::to_string_pretty(&items)
  }

  fn write(&self, content: String) -> Result<(), JsonOutputError> {
    ensure_parent_dir(&self.path)?;
    std::fs::write(&self.path, content)?;
    warn!("保存检测结果到文件: {}", self.path.display());
    Ok(())
  }
}

impl<F> Render<F, DetectResult> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    self.write(Self::to_json(result)?)
  }
}

impl<F> Render<F, ClassifyResult> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, _frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    self.write(serde_json::to_string_pretty(&result.items)?)
  }
}
