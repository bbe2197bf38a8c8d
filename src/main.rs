//! # 手写数字识别：命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与子命令分发。
//! 业务逻辑分布在 `classifier` 子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use digit_classifier::classifier::{
    crop_and_resize, encode, load_image, ClassifierConfig, CropArea, CropRegion, ImageSource, ResizeProfile,
    UploadClient,
};
use digit_classifier::error::AppError;
use digit_classifier::settings;

#[derive(Parser)]
#[command(name = "digit-classifier")]
#[command(about = "Recognize hand-drawn digits with a 28x28 MNIST model")]
#[command(version)]
struct Cli {
    /// JSON configuration file (missing or invalid file falls back to defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Resize profile: quality | balanced | speed
    #[arg(long, global = true)]
    profile: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the encoded model input as a text grid
    Preview(PreviewArgs),
    /// Classify an image with a local ONNX model
    #[cfg(feature = "onnx")]
    Classify(ClassifyArgs),
    /// Send an image to the recognition server
    Upload(UploadArgs),
}

#[derive(Args)]
struct PreviewArgs {
    image: PathBuf,
    /// square | full | x,y,w,h
    #[arg(long, default_value = "square", value_parser = parse_crop)]
    crop: CropArea,
}

#[cfg(feature = "onnx")]
#[derive(Args)]
struct ClassifyArgs {
    image: PathBuf,
    /// ONNX model file; defaults to `model_path` from the config file
    #[arg(short, long)]
    model: Option<PathBuf>,
    #[arg(long, default_value = "square", value_parser = parse_crop)]
    crop: CropArea,
    /// Number of leading scores considered by arg-max
    #[arg(long)]
    categories: Option<usize>,
}

#[derive(Args)]
struct UploadArgs {
    image: PathBuf,
    /// Overrides `upload_endpoint` from the config file
    #[arg(long)]
    endpoint: Option<String>,
}

fn parse_crop(value: &str) -> Result<CropArea, String> {
    match value.trim() {
        "square" => return Ok(CropArea::SquareAspectFill),
        "full" => return Ok(CropArea::Full),
        _ => {}
    }

    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("无效的裁剪参数 `{}`：{}", value, e))?;

    match parts.as_slice() {
        &[x, y, width, height] => Ok(CropArea::Custom(CropRegion::new(x, y, width, height))),
        _ => Err(format!("裁剪参数应为 square、full 或 x,y,w,h，当前：{}", value)),
    }
}

fn load_config(cli: &Cli) -> Result<ClassifierConfig, AppError> {
    let mut config = match &cli.config {
        Some(path) => settings::load_config_from_path(path),
        None => ClassifierConfig::default(),
    };

    if let Some(profile) = &cli.profile {
        config.apply_resize_profile(ResizeProfile::parse(profile)?);
    }

    config.validate()?;
    Ok(config)
}

fn image_source(path: &std::path::Path) -> ImageSource {
    ImageSource::FilePath(path.to_string_lossy().into_owned())
}

fn run_preview(args: &PreviewArgs, config: &ClassifierConfig) -> Result<(), AppError> {
    let buffer = load_image(image_source(&args.image), config)?;
    let crop = args.crop.resolve(&buffer);
    let resized = crop_and_resize(
        &buffer,
        crop,
        config.input.width,
        config.input.height,
        config.resize_filter,
    )?;
    let tensor = encode(&resized, &config.input)?;

    print!("{}", tensor.render_ascii());
    Ok(())
}

#[cfg(feature = "onnx")]
fn run_classify(args: &ClassifyArgs, config: ClassifierConfig) -> Result<(), AppError> {
    use digit_classifier::classifier::{load_model, ClassificationInput, DigitClassifier, PostprocessOptions, VisionInput};

    let model_path = args
        .model
        .clone()
        .or_else(|| config.model_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| AppError::Cli("缺少模型文件：请通过 --model 或配置文件 model_path 指定".to_string()))?;

    let handle = load_model(&model_path, config.input, config.intra_threads)?;
    let num_categories = args.categories.unwrap_or(config.num_categories);
    let classifier = DigitClassifier::new(handle, config)?;

    let buffer = classifier.load_image(image_source(&args.image))?;
    let input = ClassificationInput::new(VisionInput::RawBuffer(buffer))
        .with_crop_area(args.crop)
        .with_postprocess(PostprocessOptions { num_categories });
    let output = classifier.classify(input)?;

    println!("{}", output.number);
    Ok(())
}

async fn run_upload(args: &UploadArgs, mut config: ClassifierConfig) -> Result<(), AppError> {
    if let Some(endpoint) = &args.endpoint {
        config.upload_endpoint = endpoint.clone();
    }

    let buffer = load_image(image_source(&args.image), &config)?;
    let client = UploadClient::new(&config)?;
    let prediction = client.predict(&buffer).await?;

    println!("{}", prediction.predicted_number);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Preview(args) => run_preview(args, &config),
        #[cfg(feature = "onnx")]
        Commands::Classify(args) => run_classify(args, config),
        Commands::Upload(args) => run_upload(args, config).await,
    }
}

/// 分类器错误附带错误码与阶段，便于定位失败环节。
fn describe_error(err: &AppError) -> String {
    match err {
        AppError::Classifier(inner) => format!("[{}@{}] {}", inner.code(), inner.stage(), err),
        _ => err.to_string(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            log::error!("❌ 致命错误，无法继续：{}", describe_error(&err));
            ExitCode::from(2)
        }
        Err(err) => {
            log::error!("❌ 识别失败：{}", describe_error(&err));
            ExitCode::FAILURE
        }
    }
}
