// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型后处理定义
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

use serde::Serialize;

pub trait PostProcess {
  type Input;
  type Output;
  type Error;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x1, y1, x2, y2]，模型输入（letterbox 后）像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  /// 退化框（宽或高不为正）面积为 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn center(&self) -> (f32, f32) {
    (
      (self.bbox[0] + self.bbox[2]) / 2.0,
      (self.bbox[1] + self.bbox[3]) / 2.0,
    )
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 类别编号与标签文本之间的转换
pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_label_id(id: u32) -> Self;
}

mod classify;
pub use self::classify::{
  ClassifierBuilder, Classifier, ClassifyError, ClassifyItem, ClassifyResult, top_k,
};

mod coco;
pub use self::coco::{COCO_LABELS, CocoLabel, coco_label};

mod outputs;
pub use self::outputs::{ModelOutputs, OutputTensor, bind_branches, log_outputs};

mod yolov8;
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};
