//! OCR 引擎适配层
//!
//! 按固定顺序尝试引擎：首个引擎失败则依次回退，全部失败才算
//! OCR 不可用。每个引擎的结果都是带类型的 Ok/Err，不靠异常分支。
//!
//! 阈值策略：回退引擎（次选）按置信度过滤 token；首选引擎不过滤。

use image::DynamicImage;
use uidmask_ocr::OcrEngine;

use crate::token::{normalize, Token};
use crate::PipelineError;

/// 依次尝试引擎，返回首个成功引擎的归一化 token 流
///
/// `min_confidence` 只作用于非首选引擎：置信度不高于阈值的 token
/// 整条丢弃，未报告置信度的 token 视为可信保留。
pub fn extract_tokens(
    engines: &mut [&mut dyn OcrEngine],
    img: &DynamicImage,
    min_confidence: u8,
) -> Result<Vec<Token>, PipelineError> {
    let mut failures: Vec<String> = Vec::new();

    for (attempt, engine) in engines.iter_mut().enumerate() {
        let kind = engine.kind();
        match engine.recognize_image(img) {
            Ok(raw) => {
                let mut tokens = normalize(raw);
                if attempt > 0 {
                    let before = tokens.len();
                    tokens.retain(|t| t.confidence.map_or(true, |c| c > min_confidence));
                    log::info!(
                        "[Pipeline] {} 引擎置信度过滤: {} -> {}",
                        kind,
                        before,
                        tokens.len()
                    );
                }
                log::info!("[Pipeline] {} 引擎返回 {} 个 token", kind, tokens.len());
                return Ok(tokens);
            }
            Err(e) => {
                log::warn!("[Pipeline] {} 引擎失败: {}", kind, e);
                failures.push(format!("{}: {}", kind, e));
            }
        }
    }

    Err(PipelineError::OcrUnavailable(failures.join("; ")))
}
