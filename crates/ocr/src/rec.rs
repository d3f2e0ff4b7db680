//! 文字识别
//!
//! CRNN 模型 + CTC 贪婪解码。证件号码场景只需要拉丁字符与数字，
//! 默认使用内置字符集，也支持从字典文件加载。

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::error::OcrError;

/// 单行识别结果（置信度 0-1）
#[derive(Debug, Clone)]
pub struct LineResult {
    pub text: String,
    pub confidence: f32,
}

/// 文字识别器
pub struct TextRecognizer {
    session: Session,
    charset: Vec<String>,
}

impl TextRecognizer {
    /// 从 ONNX 模型与字典文件创建识别器
    pub fn new(model_path: &Path, dict_path: &Path) -> Result<Self, OcrError> {
        let charset = load_charset(dict_path)?;
        log::info!("[OCR] 加载字符集: {} 个字符", charset.len());
        Ok(Self {
            session: crate::build_session(model_path)?,
            charset,
        })
    }

    /// 使用内置拉丁字符集创建识别器
    pub fn with_builtin_charset(model_path: &Path) -> Result<Self, OcrError> {
        let charset = builtin_charset();
        log::info!("[OCR] 使用内置字符集: {} 个字符", charset.len());
        Ok(Self {
            session: crate::build_session(model_path)?,
            charset,
        })
    }

    /// 批量识别（输入为 NCHW 批次）
    pub fn recognize_batch(&mut self, input: Array4<f32>) -> Result<Vec<LineResult>, OcrError> {
        let batch_size = input.shape()[0];

        let tensor = Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::Inference(format!("识别推理失败: {}", e)))?;

        let logits = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?
            .to_owned();
        let shape = logits.shape();
        let (seq_len, num_classes) = (shape[1], shape[2]);
        drop(outputs);

        let mut results = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            results.push(self.decode_ctc(&logits.view(), b, seq_len, num_classes));
        }
        Ok(results)
    }

    /// CTC 贪婪解码：逐帧取最大类别，跳过 blank 与重复帧
    fn decode_ctc(
        &self,
        logits: &ndarray::ArrayViewD<f32>,
        batch_idx: usize,
        seq_len: usize,
        num_classes: usize,
    ) -> LineResult {
        const BLANK: usize = 0;

        let mut text = String::new();
        let mut score_sum = 0.0f32;
        let mut emitted = 0u32;
        let mut prev_class: Option<usize> = None;

        for t in 0..seq_len {
            let mut best_class = 0;
            let mut best_logit = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let v = logits[[batch_idx, t, c]];
                if v > best_logit {
                    best_logit = v;
                    best_class = c;
                }
            }

            if best_class != BLANK && prev_class != Some(best_class) {
                let char_idx = best_class - 1;
                if let Some(entry) = self.charset.get(char_idx) {
                    text.push_str(entry);
                    score_sum += 1.0 / (1.0 + (-best_logit).exp());
                    emitted += 1;
                }
            }
            prev_class = Some(best_class);
        }

        let confidence = if emitted > 0 {
            score_sum / emitted as f32
        } else {
            0.0
        };
        LineResult { text, confidence }
    }
}

fn load_charset(path: &Path) -> Result<Vec<String>, OcrError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| OcrError::ModelLoad(format!("加载字典文件失败: {}", e)))?;
    let charset: Vec<String> = content.lines().map(|s| s.to_string()).collect();
    if charset.is_empty() {
        return Err(OcrError::ModelLoad("字典文件为空".to_string()));
    }
    Ok(charset)
}

/// 内置拉丁字符集：数字、大小写字母、常见标点与空格
fn builtin_charset() -> Vec<String> {
    const LATIN: &str = "0123456789abcdefghijklmnopqrstuvwxyz\
        ABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
    let mut charset: Vec<String> = LATIN.chars().map(|c| c.to_string()).collect();
    charset.push(" ".to_string());
    charset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_charset_covers_digits() {
        let charset = builtin_charset();
        for d in '0'..='9' {
            assert!(charset.contains(&d.to_string()));
        }
        // 空格必须在表中，否则分组号码的间隔无法识别
        assert!(charset.contains(&" ".to_string()));
    }
}
