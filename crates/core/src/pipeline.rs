//! 脱敏流水线编排
//!
//! 主路径：解码 → 引擎适配 → 候选检测 → 区域求解 → 遮盖渲染。
//! 先知路径：先知给出号码文本后，用经典引擎的 token 流找回位置。
//!
//! "未发现号码"是零区域的正常结果，与流水线失败严格区分。

use image::DynamicImage;
use std::time::Instant;
use uidmask_ocr::OcrEngine;
use uidmask_oracle::RecognitionOracle;
use uidmask_render::MaskRect;

use crate::adapter::extract_tokens;
use crate::config::MaskConfig;
use crate::detect::{detect, locate_value};
use crate::resolve::{resolve, RedactionRegion};
use crate::token::normalize;
use crate::PipelineError;

/// 一次脱敏结果
#[derive(Debug)]
pub struct MaskOutcome {
    /// 脱敏后的图片（输入图片保持不变）
    pub image: DynamicImage,
    /// 实际涂黑的区域
    pub regions: Vec<RedactionRegion>,
}

impl MaskOutcome {
    pub fn found_identifier(&self) -> bool {
        !self.regions.is_empty()
    }
}

/// 解码图片字节，失败即 InvalidImage
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    image::load_from_memory(bytes).map_err(|e| PipelineError::InvalidImage(e.to_string()))
}

/// 字节入口：解码后走几何检测主路径
pub fn mask_image_bytes(
    bytes: &[u8],
    engines: &mut [&mut dyn OcrEngine],
    config: &MaskConfig,
) -> Result<MaskOutcome, PipelineError> {
    let img = decode_image(bytes)?;
    mask_identifiers(&img, engines, config)
}

/// 几何检测主路径
pub fn mask_identifiers(
    img: &DynamicImage,
    engines: &mut [&mut dyn OcrEngine],
    config: &MaskConfig,
) -> Result<MaskOutcome, PipelineError> {
    let started = Instant::now();

    let tokens = extract_tokens(engines, img, config.fallback_min_confidence)?;
    let matches = detect(&tokens);

    if matches.is_empty() {
        log::info!("[Pipeline] 未发现身份号码");
        return Ok(MaskOutcome {
            image: img.clone(),
            regions: Vec::new(),
        });
    }

    let (img_w, img_h) = (img.width(), img.height());
    let regions: Vec<RedactionRegion> = matches
        .iter()
        .filter_map(|m| resolve(m, &tokens, config, img_w, img_h))
        .collect();

    let image = apply_regions(img, &regions);
    log::info!(
        "[Pipeline] 脱敏完成: {} 处命中，{} 个遮盖区域，耗时 {} ms",
        matches.len(),
        regions.len(),
        started.elapsed().as_millis()
    );

    Ok(MaskOutcome { image, regions })
}

/// 先知辅助路径
///
/// 先知只给号码文本；几何位置从经典引擎的阈值化 token 流中找回。
/// 先知读不出号码 → 零区域的正常结果；号码存在但找不到位置 →
/// LocalizationFailed，调用方可换策略重试或转人工复核。
pub fn mask_with_oracle(
    img: &DynamicImage,
    oracle: &dyn RecognitionOracle,
    classical: &mut dyn OcrEngine,
    config: &MaskConfig,
) -> Result<MaskOutcome, PipelineError> {
    let value = match oracle.recognize(img)? {
        Some(value) => value,
        None => {
            log::info!("[Pipeline] 先知未读出号码");
            return Ok(MaskOutcome {
                image: img.clone(),
                regions: Vec::new(),
            });
        }
    };

    let raw = classical
        .recognize_image(img)
        .map_err(|e| PipelineError::OcrUnavailable(format!("{}: {}", classical.kind(), e)))?;
    let mut tokens = normalize(raw);
    tokens.retain(|t| t.confidence.map_or(true, |c| c > config.oracle_min_confidence));

    let located = locate_value(&value, &tokens).ok_or(PipelineError::LocalizationFailed)?;

    let (img_w, img_h) = (img.width(), img.height());
    let regions: Vec<RedactionRegion> = resolve(&located, &tokens, config, img_w, img_h)
        .into_iter()
        .collect();

    let image = apply_regions(img, &regions);
    log::info!("[Pipeline] 先知路径脱敏完成: {} 个遮盖区域", regions.len());

    Ok(MaskOutcome { image, regions })
}

fn apply_regions(img: &DynamicImage, regions: &[RedactionRegion]) -> DynamicImage {
    let rects: Vec<MaskRect> = regions.iter().map(|r| r.rect.to_mask_rect()).collect();
    uidmask_render::render(img, &rects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::MatchKind;
    use image::{Rgb, RgbImage};
    use uidmask_ocr::{EngineKind, OcrError, RawBox, RawToken};

    struct StubEngine {
        outcome: Result<Vec<RawToken>, String>,
    }

    impl OcrEngine for StubEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Classical
        }

        fn recognize_image(&mut self, _img: &DynamicImage) -> Result<Vec<RawToken>, OcrError> {
            match &self.outcome {
                Ok(tokens) => Ok(tokens.clone()),
                Err(msg) => Err(OcrError::Engine(msg.clone())),
            }
        }
    }

    struct StubOracle {
        value: Option<String>,
    }

    impl RecognitionOracle for StubOracle {
        fn recognize(
            &self,
            _img: &DynamicImage,
        ) -> Result<Option<String>, uidmask_oracle::OracleError> {
            Ok(self.value.clone())
        }
    }

    fn white_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    fn quad_token(text: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> RawToken {
        RawToken {
            text: text.to_string(),
            shape: RawBox::Quad([[x1, y1], [x2, y1], [x2, y2], [x1, y2]]),
            confidence: Some(80),
        }
    }

    #[test]
    fn test_whole_token_masking_end_to_end() {
        let mut engine = StubEngine {
            outcome: Ok(vec![quad_token("123456789012", 10.0, 20.0, 110.0, 44.0)]),
        };
        let mut engines: Vec<&mut dyn OcrEngine> = vec![&mut engine];
        let img = white_image(200, 100);

        let outcome = mask_identifiers(&img, &mut engines, &MaskConfig::default()).unwrap();
        assert!(outcome.found_identifier());
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.regions[0].kind, MatchKind::WholeToken);

        // 遮盖区域内变黑，区域外保持白色
        let out = outcome.image.to_rgba8();
        assert_eq!(out.get_pixel(20, 30), &image::Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(150, 30), &image::Rgba([255, 255, 255, 255]));
        // 输入图片未被改动
        assert_eq!(img.to_rgb8().get_pixel(20, 30), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_no_identifier_is_zero_region_success() {
        let mut engine = StubEngine {
            outcome: Ok(vec![quad_token("hello", 0.0, 0.0, 40.0, 10.0)]),
        };
        let mut engines: Vec<&mut dyn OcrEngine> = vec![&mut engine];
        let img = white_image(64, 32);

        let outcome = mask_identifiers(&img, &mut engines, &MaskConfig::default()).unwrap();
        assert!(!outcome.found_identifier());
        assert!(outcome.image.to_rgba8().as_raw() == img.to_rgba8().as_raw());
    }

    #[test]
    fn test_engine_failure_surfaces_as_ocr_unavailable() {
        let mut engine = StubEngine {
            outcome: Err("故障".to_string()),
        };
        let mut engines: Vec<&mut dyn OcrEngine> = vec![&mut engine];

        let result = mask_identifiers(&white_image(16, 16), &mut engines, &MaskConfig::default());
        assert!(matches!(result, Err(PipelineError::OcrUnavailable(_))));
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        let mut engine = StubEngine { outcome: Ok(vec![]) };
        let mut engines: Vec<&mut dyn OcrEngine> = vec![&mut engine];

        let result = mask_image_bytes(b"not an image", &mut engines, &MaskConfig::default());
        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
    }

    #[test]
    fn test_oracle_path_locates_and_masks() {
        let oracle = StubOracle {
            value: Some("1234 5678 9012".to_string()),
        };
        let mut classical = StubEngine {
            outcome: Ok(vec![quad_token("1234 5678 9012", 10.0, 10.0, 90.0, 30.0)]),
        };
        let img = white_image(128, 64);

        let outcome =
            mask_with_oracle(&img, &oracle, &mut classical, &MaskConfig::default()).unwrap();
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.regions[0].kind, MatchKind::Oracle);
        // 先知命中的 token 全框遮盖，不截短
        assert_eq!(outcome.regions[0].rect, crate::token::Rect::new(10, 10, 90, 30));
    }

    #[test]
    fn test_oracle_value_without_geometry_fails_distinctly() {
        let oracle = StubOracle {
            value: Some("1234 5678 9012".to_string()),
        };
        // token 流里没有任何能对上号码的文本
        let mut classical = StubEngine {
            outcome: Ok(vec![quad_token("Name", 0.0, 0.0, 30.0, 10.0)]),
        };

        let result = mask_with_oracle(
            &white_image(64, 32),
            &oracle,
            &mut classical,
            &MaskConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::LocalizationFailed)));
    }

    #[test]
    fn test_oracle_none_is_zero_region_success() {
        let oracle = StubOracle { value: None };
        let mut classical = StubEngine { outcome: Ok(vec![]) };
        let img = white_image(32, 32);

        let outcome =
            mask_with_oracle(&img, &oracle, &mut classical, &MaskConfig::default()).unwrap();
        assert!(!outcome.found_identifier());
    }

    #[test]
    fn test_oracle_path_filters_low_confidence_tokens() {
        let oracle = StubOracle {
            value: Some("1234 5678 9012".to_string()),
        };
        // 唯一命中的 token 置信度低于阈值，应被过滤导致定位失败
        let mut classical = StubEngine {
            outcome: Ok(vec![RawToken {
                text: "1234 5678 9012".to_string(),
                shape: RawBox::Rect {
                    left: 0.0,
                    top: 0.0,
                    width: 80.0,
                    height: 20.0,
                },
                confidence: Some(20),
            }]),
        };

        let result = mask_with_oracle(
            &white_image(64, 32),
            &oracle,
            &mut classical,
            &MaskConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::LocalizationFailed)));
    }
}
