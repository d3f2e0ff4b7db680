//! OCR 引擎层
//!
//! 为证件脱敏流水线提供两种文字识别引擎：
//! - 神经网络引擎（PP-OCR 风格 ONNX 模型，检测 + 识别两阶段）
//! - Tesseract 引擎（CLI 包装，经典特征 + 分类器方案）
//!
//! 两种引擎的原生输出形状不同：神经网络引擎给出四角点多边形，
//! Tesseract 给出扁平的 left/top/width/height 矩形。本层不做任何
//! 坐标归一化，统一以 [`RawToken`] 的带标签形状交给上层处理。

mod det;
mod error;
mod preprocess;
mod rec;
mod tesseract;

pub use det::{DetectedBox, TextDetector};
pub use error::OcrError;
pub use rec::{LineResult, TextRecognizer};
pub use tesseract::{tesseract_version, TesseractConfig, TesseractEngine};

use image::DynamicImage;
use ort::session::Session;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// 引擎种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// 神经网络引擎（ONNX）
    Neural,
    /// 经典引擎（Tesseract CLI）
    Classical,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Neural => write!(f, "neural"),
            EngineKind::Classical => write!(f, "classical"),
        }
    }
}

/// 引擎原生的边界形状
#[derive(Debug, Clone, PartialEq)]
pub enum RawBox {
    /// 四角点多边形，顺序为左上、右上、右下、左下
    Quad([[f32; 2]; 4]),
    /// 扁平矩形
    Rect {
        left: f32,
        top: f32,
        width: f32,
        height: f32,
    },
}

/// 引擎原始识别单元
///
/// 文本、原生形状与可选置信度（0-100）。不提供置信度的引擎
/// 置 `None`，由上层决定如何对待。
#[derive(Debug, Clone)]
pub struct RawToken {
    pub text: String,
    pub shape: RawBox,
    pub confidence: Option<u8>,
}

/// OCR 引擎统一 trait
///
/// 实现者必须把"引擎失败"与"没识别出任何文字"区分开：
/// 前者返回 [`OcrError`]，后者返回空向量。
pub trait OcrEngine: Send {
    fn kind(&self) -> EngineKind;

    /// 识别图片中的文字，按引擎自身的阅读顺序返回
    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<RawToken>, OcrError>;
}

/// 神经网络引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    /// 检测模型路径
    pub det_model_path: String,
    /// 识别模型路径
    pub rec_model_path: String,
    /// 字典文件路径（可选，不提供则使用内置拉丁字符集）
    pub dict_path: Option<String>,
}

const REC_BATCH_SIZE: usize = 16;

/// 神经网络 OCR 引擎（检测 + 识别）
pub struct NeuralOcrEngine {
    detector: TextDetector,
    recognizer: TextRecognizer,
}

impl NeuralOcrEngine {
    pub fn new(config: &NeuralConfig) -> Result<Self, OcrError> {
        log::info!("[OCR] 加载检测模型: {}", config.det_model_path);
        let detector = TextDetector::new(Path::new(&config.det_model_path))?;

        log::info!("[OCR] 加载识别模型: {}", config.rec_model_path);
        let recognizer = match &config.dict_path {
            Some(dict) => TextRecognizer::new(Path::new(&config.rec_model_path), Path::new(dict))?,
            None => TextRecognizer::with_builtin_charset(Path::new(&config.rec_model_path))?,
        };

        log::info!("[OCR] 神经网络引擎初始化完成");
        Ok(Self { detector, recognizer })
    }
}

impl OcrEngine for NeuralOcrEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Neural
    }

    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<RawToken>, OcrError> {
        let started = Instant::now();
        let (orig_w, orig_h) = (img.width(), img.height());

        // 1. 文字检测
        let (det_input, input_w, input_h) = preprocess::prepare_det_input(img);
        let boxes = self.detector.detect(det_input, input_w, input_h, orig_w, orig_h)?;
        log::info!("[OCR] 检测到 {} 个文字区域", boxes.len());

        if boxes.is_empty() {
            return Ok(Vec::new());
        }

        // 2. 逐区域裁剪后批量识别
        let crops: Vec<DynamicImage> = boxes
            .iter()
            .map(|b| preprocess::crop_quad(img, &b.points))
            .collect();

        let mut lines = Vec::with_capacity(crops.len());
        for batch in preprocess::prepare_rec_batches(&crops, REC_BATCH_SIZE) {
            lines.extend(self.recognizer.recognize_batch(batch)?);
        }

        // 3. 组装原始 token，空文本直接丢弃
        let mut tokens = Vec::with_capacity(boxes.len());
        for (text_box, line) in boxes.into_iter().zip(lines) {
            if line.text.trim().is_empty() {
                continue;
            }
            log::debug!(
                "[OCR] 区域 \"{}\" (置信度: {:.2})",
                line.text,
                line.confidence
            );
            tokens.push(RawToken {
                text: line.text,
                shape: RawBox::Quad(text_box.points),
                confidence: Some(scale_confidence(line.confidence)),
            });
        }

        log::info!(
            "[OCR] 识别完成，共 {} 个结果，耗时 {} ms",
            tokens.len(),
            started.elapsed().as_millis()
        );
        Ok(tokens)
    }
}

/// 将 0-1 浮点置信度换算为 0-100 整数
fn scale_confidence(score: f32) -> u8 {
    (score.clamp(0.0, 1.0) * 100.0).round() as u8
}

// 推理会话线程数默认不超过 4，可用 UIDMASK_OCR_THREADS 覆盖
const DEFAULT_MAX_THREADS: usize = 4;

fn session_thread_count() -> usize {
    if let Some(n) = std::env::var("UIDMASK_OCR_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
    {
        return n;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_THREADS)
        .min(DEFAULT_MAX_THREADS)
}

/// 构建 ONNX 推理会话（检测与识别模型共用）
pub(crate) fn build_session(model_path: &Path) -> Result<Session, OcrError> {
    let intra = session_thread_count();
    log::info!("[OCR] 会话线程数: {}", intra);

    Session::builder()
        .and_then(|b| Ok(b.with_intra_threads(intra)?))
        .and_then(|b| Ok(b.with_inter_threads(1)?))
        .and_then(|b| Ok(b.with_parallel_execution(false)?))
        .map_err(|e| OcrError::ModelLoad(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OcrError::ModelLoad(format!("加载模型失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_confidence() {
        assert_eq!(scale_confidence(0.0), 0);
        assert_eq!(scale_confidence(0.666), 67);
        assert_eq!(scale_confidence(1.0), 100);
        // 越界值被钳制
        assert_eq!(scale_confidence(1.5), 100);
        assert_eq!(scale_confidence(-0.2), 0);
    }
}
