// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出检测结果
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectItem, DetectResult},
  output::{LabelMode, OutputError, Render},
};

pub struct LogOutput {
  label: LabelMode,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(LogOutput {
      label: LabelMode::from_url(url),
    })
  }
}

impl LogOutput {
  pub fn format_item(&self, item: &DetectItem) -> String {
    let [x1, y1, x2, y2] = item.bbox;
    format!(
      "{}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      self.label.label(item.class_id),
      item.score * 100.0,
      x1,
      y1,
      x2 - x1,
      y2 - y1
    )
  }
}

impl<F> Render<F, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    info!("检测到 {} 个对象", result.len());
    for item in result.items.iter() {
      info!("  - {}", self.format_item(item));
    }
    Ok(())
  }
}

impl<F> Render<F, ClassifyResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &ClassifyResult) -> Result<(), Self::Error> {
    info!("前 {} 个类别:", result.len());
    for (rank, item) in result.items.iter().enumerate() {
      info!("  #{} 类别 {}: {:.6}", rank + 1, item.class_id, item.prob);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_label_score_and_box() {
    let output = LogOutput::from_url(&Url::parse("log://stdout").unwrap()).unwrap();
    let item = DetectItem {
      class_id: 0,
      score: 0.875,
      bbox: [10.0, 20.0, 110.0, 70.0],
    };
    assert_eq!(output.format_item(&item), "person: 87.50% at (10, 20, 100x50)");

    let output = LogOutput::from_url(&Url::parse("log://stdout?label=id").unwrap()).unwrap();
    assert_eq!(output.format_item(&item), "0: 87.50% at (10, 20, 100x50)");
  }
}
