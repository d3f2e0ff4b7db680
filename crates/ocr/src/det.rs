//! 文字检测
//!
//! DBNet (Differentiable Binarization) 风格模型：输出逐像素概率图，
//! 二值化后按四邻域连通域聚合成文字框，再映射回原图像素坐标。

use ndarray::{Array2, Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::error::OcrError;

/// 概率图二值化阈值
const PROB_THRESH: f32 = 0.3;
/// 连通域平均得分阈值
const BOX_SCORE_THRESH: f32 = 0.5;
/// 最小框边长（概率图坐标系）
const MIN_BOX_SIDE: f32 = 5.0;
/// 框外扩比例
const UNCLIP_RATIO: f32 = 1.6;

/// 检测到的文字框（四角点，原图像素坐标）
#[derive(Debug, Clone)]
pub struct DetectedBox {
    pub points: [[f32; 2]; 4],
    pub score: f32,
}

/// 文字检测器
pub struct TextDetector {
    session: Session,
}

impl TextDetector {
    /// 从 ONNX 模型文件创建检测器
    pub fn new(model_path: &Path) -> Result<Self, OcrError> {
        Ok(Self {
            session: crate::build_session(model_path)?,
        })
    }

    /// 对预处理后的输入做推理，返回映射回原图坐标的文字框
    pub fn detect(
        &mut self,
        input: Array4<f32>,
        input_w: u32,
        input_h: u32,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<DetectedBox>, OcrError> {
        let tensor = Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::Inference(format!("检测推理失败: {}", e)))?;

        // 复制输出，避免与 session 的借用冲突
        let prob_map = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        boxes_from_prob_map(&prob_map.view(), input_w, input_h, orig_w, orig_h)
    }
}

/// 读取概率图上一点的值，兼容 NCHW 与 CHW 两种输出形状
fn prob_at(map: &ArrayViewD<f32>, y: usize, x: usize) -> f32 {
    match map.ndim() {
        4 => map[[0, 0, y, x]],
        3 => map[[0, y, x]],
        _ => 0.0,
    }
}

fn boxes_from_prob_map(
    map: &ArrayViewD<f32>,
    input_w: u32,
    input_h: u32,
    orig_w: u32,
    orig_h: u32,
) -> Result<Vec<DetectedBox>, OcrError> {
    let shape = map.shape();
    let (h, w) = match map.ndim() {
        4 => (shape[2], shape[3]),
        3 => (shape[1], shape[2]),
        _ => return Err(OcrError::Inference(format!("意外的检测输出形状: {:?}", shape))),
    };

    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut boxes = Vec::new();

    for seed_y in 0..h {
        for seed_x in 0..w {
            if visited[[seed_y, seed_x]] || prob_at(map, seed_y, seed_x) <= PROB_THRESH {
                continue;
            }

            // 洪泛收集一个连通域，顺便累计得分
            let (mut min_x, mut max_x) = (seed_x, seed_x);
            let (mut min_y, mut max_y) = (seed_y, seed_y);
            let mut score_sum = 0.0f32;
            let mut area = 0usize;
            let mut stack = vec![(seed_x, seed_y)];
            visited[[seed_y, seed_x]] = true;

            while let Some((x, y)) = stack.pop() {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                score_sum += prob_at(map, y, x);
                area += 1;

                for (dx, dy) in [(0i32, -1i32), (0, 1), (-1, 0), (1, 0)] {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    if !visited[[ny, nx]] && prob_at(map, ny, nx) > PROB_THRESH {
                        visited[[ny, nx]] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            let box_w = (max_x - min_x) as f32;
            let box_h = (max_y - min_y) as f32;
            if box_w < MIN_BOX_SIDE || box_h < MIN_BOX_SIDE {
                continue;
            }
            let score = score_sum / area as f32;
            if score < BOX_SCORE_THRESH {
                continue;
            }

            // 外扩后钳制到概率图范围，再换算到原图坐标
            let pad_x = box_w * (UNCLIP_RATIO - 1.0) / 2.0;
            let pad_y = box_h * (UNCLIP_RATIO - 1.0) / 2.0;
            let x1 = (min_x as f32 - pad_x).max(0.0);
            let y1 = (min_y as f32 - pad_y).max(0.0);
            let x2 = (max_x as f32 + pad_x).min(w as f32 - 1.0);
            let y2 = (max_y as f32 + pad_y).min(h as f32 - 1.0);

            let sx = orig_w as f32 / input_w as f32;
            let sy = orig_h as f32 / input_h as f32;

            boxes.push(DetectedBox {
                points: [
                    [x1 * sx, y1 * sy],
                    [x2 * sx, y1 * sy],
                    [x2 * sx, y2 * sy],
                    [x1 * sx, y2 * sy],
                ],
                score,
            });
        }
    }

    // 按 top 坐标排序，保持自上而下的阅读顺序
    boxes.sort_by(|a, b| {
        a.points[0][1]
            .partial_cmp(&b.points[0][1])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(boxes)
}
