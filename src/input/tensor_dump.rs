// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/tensor_dump.rs - 从文件读取推理输出张量
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::TensorLayout,
  model::{ModelOutputs, OutputTensor},
  quant::{QuantError, QuantParams, element_count},
};

#[derive(Error, Debug)]
pub enum TensorDumpInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("I/O 错误 {}: {}", .0.display(), .1)]
  IoError(PathBuf, std::io::Error),
  #[error("清单解析错误: {0}")]
  ManifestError(#[from] serde_json::Error),
  #[error("输出 {index} ({}) 数据长度不匹配: 维度 {dims:?} 共 {expected} 个元素, 实际 {actual}", .file.display())]
  DataLength {
    index: usize,
    file: PathBuf,
    dims: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("输出 {0} 的量化参数无效: {1}")]
  Quant(usize, QuantError),
}

/// 清单文件格式
///
/// ```json
/// { "outputs": [ { "file": "output0.bin", "dims": [1, 64, 80, 80],
///                  "layout": "nchw", "scale": 0.08, "zero_point": -56 } ] }
/// ```
#[derive(Debug, Deserialize)]
struct Manifest {
  outputs: Vec<ManifestOutput>,
}

#[derive(Debug, Deserialize)]
struct ManifestOutput {
  file: PathBuf,
  dims: Vec<usize>,
  #[serde(default)]
  layout: TensorLayout,
  scale: f32,
  zero_point: i32,
}

/// 一个输出张量的完整拷贝
#[derive(Debug, Clone)]
pub struct DumpTensor {
  pub dims: Vec<usize>,
  pub layout: TensorLayout,
  pub quant: QuantParams,
  pub data: Vec<i8>,
}

/// 一次推理的全部输出
#[derive(Debug, Clone, Default)]
pub struct TensorDumpFrame {
  pub tensors: Vec<DumpTensor>,
}

impl ModelOutputs for TensorDumpFrame {
  fn num_outputs(&self) -> usize {
    self.tensors.len()
  }

  fn output(&self, index: usize) -> Option<OutputTensor<'_>> {
    self.tensors.get(index).map(|tensor| OutputTensor {
      index,
      dims: &tensor.dims,
      layout: tensor.layout,
      quant: tensor.quant,
      data: &tensor.data,
    })
  }
}

impl TensorDumpFrame {
  /// 读取清单及其引用的原始 int8 文件，文件路径相对于清单所在目录
  pub fn load(manifest_path: &Path) -> Result<Self, TensorDumpInputError> {
    let text = std::fs::read_to_string(manifest_path)
      .map_err(|e| TensorDumpInputError::IoError(manifest_path.to_path_buf(), e))?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new(""));

    let mut tensors = Vec::with_capacity(manifest.outputs.len());
    for (index, output) in manifest.outputs.into_iter().enumerate() {
      let path = base.join(&output.file);
      let bytes =
        std::fs::read(&path).map_err(|e| TensorDumpInputError::IoError(path.clone(), e))?;

      let expected = element_count(&output.dims).unwrap_or(usize::MAX);
      if bytes.len() != expected {
        error!(
          "输出 {} 数据长度不匹配: 期望 {}, 实际 {}",
          index,
          expected,
          bytes.len()
        );
        return Err(TensorDumpInputError::DataLength {
          index,
          file: path,
          dims: output.dims,
          expected,
          actual: bytes.len(),
        });
      }

      let quant = QuantParams::new(output.scale, output.zero_point)
        .map_err(|e| TensorDumpInputError::Quant(index, e))?;

      debug!(
        "输出 {}: {:?} {:?}, scale={}, zp={}",
        index, output.dims, output.layout, quant.scale, quant.zero_point
      );

      tensors.push(DumpTensor {
        dims: output.dims,
        layout: output.layout,
        quant,
        data: bytes.into_iter().map(|b| b as i8).collect(),
      });
    }

    Ok(Self { tensors })
  }
}

pub struct TensorDumpInput {
  frame: Option<TensorDumpFrame>,
}

impl FromUrlWithScheme for TensorDumpInput {
  const SCHEME: &'static str = "dump";
}

impl FromUrl for TensorDumpInput {
  type Error = TensorDumpInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorDumpInputError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let path = PathBuf::from(url.path());
    info!("读取张量清单: {}", path.display());
    let frame = TensorDumpFrame::load(&path)?;
    info!("共 {} 个输出张量", frame.tensors.len());

    Ok(TensorDumpInput { frame: Some(frame) })
  }
}

impl TensorDumpInput {
  pub fn into_frames(self) -> TensorDumpFrames {
    TensorDumpFrames { inner: self }
  }
}

pub struct TensorDumpFrames {
  inner: TensorDumpInput,
}

impl Iterator for TensorDumpFrames {
  type Item = TensorDumpFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.frame.take()
  }
}
