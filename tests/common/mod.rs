// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 测试用合成模型输出
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

#![allow(dead_code)]

use shanan_decode::{
  detect::{DetectionBranch, TensorLayout},
  model::{ModelOutputs, OutputTensor},
  quant::{QuantParams, QuantizedTensor},
};

pub const BINS: usize = 16;

/// 回归输出直接存放 logits
pub fn box_params() -> QuantParams {
  QuantParams::new(1.0, 0).unwrap()
}

/// 分类得分 `(raw + 128) / 128`，-128 对应 0
pub fn class_params() -> QuantParams {
  QuantParams::new(1.0 / 128.0, -128).unwrap()
}

/// 线性同余发生器，保证测试数据可复现
pub struct Lcg(u64);

impl Lcg {
  pub fn new(seed: u64) -> Self {
    Self(seed)
  }

  pub fn next_i8(&mut self) -> i8 {
    self.0 = self
      .0
      .wrapping_mul(6364136223846793005)
      .wrapping_add(1442695040888963407);
    (self.0 >> 56) as u8 as i8
  }
}

/// 单个尺度的 NCHW 量化输出
#[derive(Debug, Clone)]
pub struct Head {
  pub grid: usize,
  pub num_classes: usize,
  pub boxes: Vec<i8>,
  pub classes: Vec<i8>,
  pub gate: Vec<i8>,
}

impl Head {
  /// 所有得分为 0，回归 logits 全相等
  pub fn empty(grid: usize, num_classes: usize) -> Self {
    let cells = grid * grid;
    Self {
      grid,
      num_classes,
      boxes: vec![0; 4 * BINS * cells],
      classes: vec![-128; num_classes * cells],
      gate: vec![-128; cells],
    }
  }

  /// 随机填充分类与回归，门控取每个单元的最大类别值
  pub fn random(grid: usize, num_classes: usize, rng: &mut Lcg) -> Self {
    let mut head = Self::empty(grid, num_classes);
    head.boxes.iter_mut().for_each(|v| *v = rng.next_i8() / 8);
    head.classes.iter_mut().for_each(|v| *v = rng.next_i8());
    head.refresh_gate();
    head
  }

  pub fn cells(&self) -> usize {
    self.grid * self.grid
  }

  pub fn refresh_gate(&mut self) {
    let cells = self.cells();
    for cell in 0..cells {
      self.gate[cell] = (0..self.num_classes)
        .map(|c| self.classes[c * cells + cell])
        .max()
        .unwrap_or(-128);
    }
  }

  /// 在单元 `cell` 放置一个目标，四条边的分布分别集中在 `peaks` 对应的 bin
  pub fn place(&mut self, cell: usize, class: usize, raw_score: i8, peaks: [usize; 4]) {
    let cells = self.cells();
    self.classes[class * cells + cell] = raw_score;
    for (side, &peak) in peaks.iter().enumerate() {
      for bin in 0..BINS {
        let channel = side * BINS + bin;
        self.boxes[channel * cells + cell] = if bin == peak { 20 } else { -5 };
      }
    }
    self.refresh_gate();
  }

  /// 目标框的期望位置
  pub fn expected_box(&self, cell: usize, stride: f32, peaks: [usize; 4]) -> [f32; 4] {
    let cx = ((cell % self.grid) as f32 + 0.5) * stride;
    let cy = ((cell / self.grid) as f32 + 0.5) * stride;
    [
      cx - peaks[0] as f32 * stride,
      cy - peaks[1] as f32 * stride,
      cx + peaks[2] as f32 * stride,
      cy + peaks[3] as f32 * stride,
    ]
  }

  pub fn branch(&self, stride: f32, with_gate: bool) -> DetectionBranch<'_> {
    let g = self.grid;
    let branch = DetectionBranch::new(
      g,
      g,
      stride,
      QuantizedTensor::new(&self.boxes, box_params(), &[1, 4 * BINS, g, g]).unwrap(),
      QuantizedTensor::new(&self.classes, class_params(), &[1, self.num_classes, g, g]).unwrap(),
    );
    if with_gate {
      branch.with_gate(QuantizedTensor::new(&self.gate, class_params(), &[1, 1, g, g]).unwrap())
    } else {
      branch
    }
  }
}

/// 按 回归、分类、门控 的顺序依次暴露每个尺度的输出
pub struct FakeFrame {
  tensors: Vec<(Vec<usize>, QuantParams, Vec<i8>)>,
}

impl FakeFrame {
  pub fn new(heads: &[Head]) -> Self {
    let mut tensors = Vec::new();
    for head in heads {
      let g = head.grid;
      tensors.push((vec![1, 4 * BINS, g, g], box_params(), head.boxes.clone()));
      tensors.push((vec![1, head.num_classes, g, g], class_params(), head.classes.clone()));
      tensors.push((vec![1, 1, g, g], class_params(), head.gate.clone()));
    }
    Self { tensors }
  }
}

impl ModelOutputs for FakeFrame {
  fn num_outputs(&self) -> usize {
    self.tensors.len()
  }

  fn output(&self, index: usize) -> Option<OutputTensor<'_>> {
    self
      .tensors
      .get(index)
      .map(|(dims, quant, data)| OutputTensor {
        index,
        dims,
        layout: TensorLayout::Nchw,
        quant: *quant,
        data,
      })
  }
}

pub fn assert_box_near(actual: [f32; 4], expected: [f32; 4]) {
  for (a, e) in actual.iter().zip(expected.iter()) {
    assert!((a - e).abs() < 1e-3, "{:?} != {:?}", actual, expected);
  }
}
