//! 批量脱敏命令行
//!
//! 扫描输入目录（或单个文件）里的证件图片，对每张执行脱敏流水线，
//! 结果写入输出目录。单张图片的失败只记日志，不中断批次。

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use uidmask_core::{mask_identifiers, mask_with_oracle, MaskConfig, MaskOutcome, PipelineError};
use uidmask_ocr::{NeuralConfig, NeuralOcrEngine, OcrEngine, TesseractConfig, TesseractEngine};
use uidmask_oracle::{VisionOracle, VisionOracleConfig};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Parser)]
#[command(name = "uidmask", about = "证件图片身份号码脱敏工具")]
struct Args {
    /// 输入图片或目录
    input: PathBuf,

    /// 输出目录
    #[arg(short, long, default_value = "masked")]
    output: PathBuf,

    /// 检测模型路径（ONNX）
    #[arg(long)]
    det_model: Option<PathBuf>,

    /// 识别模型路径（ONNX）
    #[arg(long)]
    rec_model: Option<PathBuf>,

    /// 字典文件路径（可选）
    #[arg(long)]
    dict: Option<PathBuf>,

    /// Tesseract 语言
    #[arg(long, default_value = "eng")]
    lang: String,

    /// 几何检测无结果时启用先知辅助路径（需 OPENAI_API_KEY）
    #[arg(long)]
    oracle: bool,

    /// 回退引擎置信度阈值 (0-100)
    #[arg(long)]
    min_confidence: Option<u8>,

    /// 单 token 遮盖宽度比例
    #[arg(long)]
    truncation_ratio: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = MaskConfig::default();
    if let Some(min_conf) = args.min_confidence {
        config.fallback_min_confidence = min_conf;
        config.oracle_min_confidence = min_conf;
    }
    if let Some(ratio) = args.truncation_ratio {
        config.truncation_ratio = ratio;
    }

    // 引擎构造一次，整个批次复用
    let mut neural = build_neural_engine(&args)?;
    let mut classical = TesseractEngine::new(TesseractConfig {
        lang: Some(args.lang.clone()),
        ..TesseractConfig::default()
    })
    .context("Tesseract 引擎初始化失败")?;

    let oracle = if args.oracle {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("启用先知路径需要设置 OPENAI_API_KEY")?;
        Some(VisionOracle::new(VisionOracleConfig::new(api_key))?)
    } else {
        None
    };

    let files = collect_image_files(&args.input)?;
    if files.is_empty() {
        bail!("在 {} 下没有找到图片文件", args.input.display());
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("无法创建输出目录 {}", args.output.display()))?;

    let mut failed = 0usize;
    for file in &files {
        match process_one(
            file,
            &args.output,
            neural.as_mut(),
            &mut classical,
            oracle.as_ref(),
            &config,
        ) {
            Ok(regions) => {
                if regions == 0 {
                    log::info!("[CLI] {}: 未发现身份号码", file.display());
                } else {
                    log::info!("[CLI] {}: 已遮盖 {} 处", file.display(), regions);
                }
            }
            Err(e) => {
                // 单张失败不影响批次里的其他图片
                log::error!("[CLI] {}: {:#}", file.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{}/{} 张图片处理失败", failed, files.len());
    }
    Ok(())
}

fn build_neural_engine(args: &Args) -> Result<Option<NeuralOcrEngine>> {
    let (det, rec) = match (&args.det_model, &args.rec_model) {
        (Some(det), Some(rec)) => (det, rec),
        (None, None) => {
            log::warn!("[CLI] 未提供 ONNX 模型路径，只使用 Tesseract 引擎");
            return Ok(None);
        }
        _ => bail!("--det-model 与 --rec-model 必须同时提供"),
    };

    let engine = NeuralOcrEngine::new(&NeuralConfig {
        det_model_path: det.to_string_lossy().into_owned(),
        rec_model_path: rec.to_string_lossy().into_owned(),
        dict_path: args.dict.as_ref().map(|p| p.to_string_lossy().into_owned()),
    })
    .context("神经网络引擎初始化失败")?;
    Ok(Some(engine))
}

fn collect_image_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(input)
        .with_context(|| format!("无法读取目录 {}", input.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn process_one(
    file: &Path,
    output_dir: &Path,
    neural: Option<&mut NeuralOcrEngine>,
    classical: &mut TesseractEngine,
    oracle: Option<&VisionOracle>,
    config: &MaskConfig,
) -> Result<usize> {
    let bytes = fs::read(file).with_context(|| format!("读取 {} 失败", file.display()))?;
    let img = uidmask_core::decode_image(&bytes)?;

    // 主路径：神经网络引擎优先，失败回退 Tesseract
    let outcome = {
        let mut engines: Vec<&mut dyn OcrEngine> = Vec::with_capacity(2);
        if let Some(neural) = neural {
            engines.push(neural);
        }
        engines.push(&mut *classical);
        mask_identifiers(&img, &mut engines, config)?
    };

    // 几何检测空手而归且启用了先知时，换先知路径再试一次
    let outcome: MaskOutcome = match (outcome.found_identifier(), oracle) {
        (false, Some(oracle)) => {
            log::info!("[CLI] {}: 几何检测无结果，尝试先知路径", file.display());
            match mask_with_oracle(&img, oracle, classical, config) {
                Ok(retried) => retried,
                Err(PipelineError::LocalizationFailed) => {
                    // 号码确认存在但定位失败，必须显式上报
                    bail!("号码存在但无法定位，请转人工复核");
                }
                Err(e) => return Err(e.into()),
            }
        }
        (_, _) => outcome,
    };

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.png");
    let out_path = output_dir.join(format!("masked_{}", file_name));

    save_image(&outcome, &out_path)?;
    Ok(outcome.regions.len())
}

fn save_image(outcome: &MaskOutcome, path: &Path) -> Result<()> {
    // JPEG 不支持 alpha，统一转 RGB 落盘
    let rgb = image::DynamicImage::ImageRgb8(outcome.image.to_rgb8());
    rgb.save(path)
        .with_context(|| format!("写入 {} 失败", path.display()))?;
    Ok(())
}
