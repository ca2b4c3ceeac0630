// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::Path;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  letterbox::Letterbox,
  model::{ClassifyResult, CocoLabel, DetectItem, DetectResult, WithLabel},
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod json_output;
mod log_output;
mod record;

pub use self::json_output::{JsonOutput, JsonOutputError};
pub use self::log_output::LogOutput;
pub use self::record::{RecordOutput, RecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 输出错误: {0}")]
  JsonOutputError(#[from] JsonOutputError),
  #[error("记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 标签显示方式，由 URL 参数 `label=id` 切换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
  #[default]
  Name,
  Id,
}

impl LabelMode {
  pub fn from_url(url: &Url) -> Self {
    match url.query_pairs().find(|(k, _)| k == "label") {
      Some((_, v)) if v == "id" => LabelMode::Id,
      _ => LabelMode::Name,
    }
  }

  /// 类别名称未知时退回类别编号
  pub fn label(&self, class_id: u32) -> String {
    match self {
      LabelMode::Name => CocoLabel::from_label_id(class_id).to_label_str(),
      LabelMode::Id => class_id.to_string(),
    }
  }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}

pub enum OutputWrapper {
  Log(LogOutput),
  Record(RecordOutput),
  Json(JsonOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      RecordOutput::SCHEME => Ok(OutputWrapper::Record(RecordOutput::from_url(url)?)),
      JsonOutput::SCHEME => Ok(OutputWrapper::Json(JsonOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl<F> Render<F, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output
        .render_result(frame, result)
        .map_err(|never| match never {}),
      OutputWrapper::Record(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::Json(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

impl<F> Render<F, ClassifyResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output
        .render_result(frame, result)
        .map_err(|never| match never {}),
      OutputWrapper::Record(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::Json(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

/// 渲染前把检测框映射回原图坐标
///
/// 解码结果默认处于模型输入（letterbox 后）坐标系，只有显式包装时才做映射。
pub struct Unletterbox<O> {
  inner: O,
  letterbox: Letterbox,
}

impl<O> Unletterbox<O> {
  pub fn new(inner: O, letterbox: Letterbox) -> Self {
    warn!(
      "检测框将映射回原图坐标: {}x{}, 缩放 {}, 填充 ({}, {})",
      letterbox.src_w, letterbox.src_h, letterbox.scale, letterbox.pad_x, letterbox.pad_y
    );
    Self { inner, letterbox }
  }
}

impl<F, O: Render<F, DetectResult>> Render<F, DetectResult> for Unletterbox<O> {
  type Error = O::Error;

  fn render_result(&self, frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    let mapped = DetectResult {
      items: result
        .items
        .iter()
        .map(|item| self.letterbox.unmap(item))
        .collect::<Vec<DetectItem>>()
        .into_boxed_slice(),
    };
    self.inner.render_result(frame, &mapped)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_mode_from_url() {
    let url = Url::parse("record:///tmp/a.txt?label=id").unwrap();
    assert_eq!(LabelMode::from_url(&url), LabelMode::Id);
    let url = Url::parse("record:///tmp/a.txt").unwrap();
    assert_eq!(LabelMode::from_url(&url), LabelMode::Name);

    assert_eq!(LabelMode::Name.label(2), "car");
    assert_eq!(LabelMode::Name.label(200), "200");
    assert_eq!(LabelMode::Id.label(2), "2");
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn unletterbox_maps_before_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let url = Url::parse(&format!("record://{}?label=id", path.display())).unwrap();
    let output = Unletterbox::new(
      RecordOutput::from_url(&url).unwrap(),
      Letterbox::new(1280, 720, 640),
    );

    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 1,
        score: 0.5,
        bbox: [100.0, 240.0, 300.0, 340.0],
      }]
      .into_boxed_slice(),
    };
    output.render_result(&(), &result).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "1, 0.5000, 200.0000, 200.0000, 600.0000, 400.0000");
  }
}
