//! Tesseract OCR 引擎（CLI 包装）
//!
//! 调用系统安装的 tesseract 可执行文件，以 TSV 输出取词级结果。
//! 坐标为原图像素，置信度为 0-100 整数。

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::OcrError;
use crate::{EngineKind, OcrEngine, RawBox, RawToken};

/// Tesseract 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TesseractConfig {
    /// 可执行文件路径，缺省走 PATH
    pub binary_path: Option<String>,
    /// tessdata 目录路径
    pub tessdata_path: Option<String>,
    /// 语言（如 "eng"）
    pub lang: Option<String>,
    /// 页面分割模式 (0-13)
    pub psm: Option<u8>,
    /// OCR 引擎模式 (0-3)
    pub oem: Option<u8>,
}

impl TesseractConfig {
    pub fn lang_or_default(&self) -> &str {
        self.lang.as_deref().unwrap_or("eng")
    }

    pub fn psm_or_default(&self) -> u8 {
        self.psm.unwrap_or(6)
    }

    pub fn oem_or_default(&self) -> u8 {
        self.oem.unwrap_or(1)
    }

    fn binary(&self) -> &str {
        self.binary_path.as_deref().unwrap_or("tesseract")
    }
}

// 临时文件序号，避免并发实例互相覆盖
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Tesseract OCR 引擎
pub struct TesseractEngine {
    config: TesseractConfig,
    version: String,
}

impl TesseractEngine {
    /// 创建引擎，构造时探测可执行文件是否可用
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let version = tesseract_version(config.binary())?;
        log::info!("[Tesseract] 初始化成功，版本: {}", version);
        Ok(Self { config, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn run_cli(&self, image_path: &str) -> Result<String, OcrError> {
        let mut cmd = Command::new(self.config.binary());
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(self.config.lang_or_default())
            .arg("--psm")
            .arg(self.config.psm_or_default().to_string())
            .arg("--oem")
            .arg(self.config.oem_or_default().to_string())
            .arg("tsv");

        if let Some(tessdata) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata);
        }

        let output = cmd
            .output()
            .map_err(|e| OcrError::Engine(format!("执行 tesseract 失败: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!("tesseract 执行失败: {}", stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Classical
    }

    fn recognize_image(&mut self, img: &DynamicImage) -> Result<Vec<RawToken>, OcrError> {
        let started = Instant::now();

        // tesseract 只接受文件输入，经由临时 PNG 中转
        let temp_path = std::env::temp_dir().join(format!(
            "uidmask_ocr_{}_{}.png",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        img.save(&temp_path)
            .map_err(|e| OcrError::ImageProcess(format!("保存临时图片失败: {}", e)))?;

        let result = self.run_cli(temp_path.to_string_lossy().as_ref());
        let _ = std::fs::remove_file(&temp_path);

        let tokens = parse_tsv(&result?);
        log::info!(
            "[Tesseract] 识别完成，耗时 {} ms，结果数: {}",
            started.elapsed().as_millis(),
            tokens.len()
        );
        Ok(tokens)
    }
}

/// 解析 Tesseract TSV 输出
///
/// 列序：level page_num block_num par_num line_num word_num
///       left top width height conf text
///
/// 只保留词级行（level=5）、非空文本、conf >= 0 的结果。
fn parse_tsv(tsv: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();

        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        let left: f32 = cols[6].parse().unwrap_or(0.0);
        let top: f32 = cols[7].parse().unwrap_or(0.0);
        let width: f32 = cols[8].parse().unwrap_or(0.0);
        let height: f32 = cols[9].parse().unwrap_or(0.0);

        tokens.push(RawToken {
            text: text.to_string(),
            shape: RawBox::Rect {
                left,
                top,
                width,
                height,
            },
            confidence: Some(conf.round().clamp(0.0, 100.0) as u8),
        });
    }

    tokens
}

/// 探测 tesseract 版本，探测失败视为引擎不可用
pub fn tesseract_version(binary: &str) -> Result<String, OcrError> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::Engine(format!("无法执行 tesseract: {}", e)))?;

    if !output.status.success() {
        return Err(OcrError::Engine("tesseract --version 执行失败".to_string()));
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    // 第一行形如 "tesseract 5.3.0" 或 "tesseract v5.3.0"
    for line in combined.lines() {
        if line.contains("tesseract") {
            if let Some(version) = line.split_whitespace().nth(1) {
                return Ok(version.trim_start_matches('v').to_string());
            }
        }
    }

    Ok("unknown".to_string())
}
