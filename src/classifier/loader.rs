//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（本地文件 / Base64 / 内存字节）的编码图片加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - Base64：格式解析 + 解码前体积上界估算。
//! - 签名：magic bytes 必须是图片。
//! - 解码：先读 header 尺寸做像素上限检查，再完整解码为 `ImageBuffer`。

use base64::{Engine as _, engine::general_purpose};
use std::io::Cursor;
use std::path::Path;

use super::source::{ImageBuffer, ImageSource, RawImageData};
use super::{ClassifierConfig, ClassifierError};

/// 加载并解码任意来源的图片。
pub fn load_image(source: ImageSource, config: &ClassifierConfig) -> Result<ImageBuffer, ClassifierError> {
    let raw = match source {
        ImageSource::FilePath(path) => load_from_file(&path, config)?,
        ImageSource::Base64(data) => load_from_base64(&data, config)?,
        ImageSource::Bytes(bytes) => load_from_bytes(bytes, config)?,
    };
    decode_raw_image(raw, config)
}

/// 从本地路径加载图片原始字节。
pub(crate) fn load_from_file(path: &str, config: &ClassifierConfig) -> Result<RawImageData, ClassifierError> {
    log::info!("📁 开始读取本地图片 - 路径: {}", path);

    let file_path = Path::new(path);
    if !file_path.exists() {
        return Err(ClassifierError::FileSystem(format!("文件不存在：{}", path)));
    }

    let metadata = std::fs::metadata(file_path)
        .map_err(|e| ClassifierError::FileSystem(format!("无法读取文件信息：{}", e)))?;

    if metadata.len() > config.max_file_size {
        return Err(ClassifierError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    let bytes = std::fs::read(file_path)
        .map_err(|e| ClassifierError::FileSystem(format!("无法读取图片文件：{}", e)))?;
    validate_image_signature(&bytes)?;

    Ok(RawImageData {
        bytes,
        source_hint: "file",
    })
}

pub(crate) fn load_from_base64(data: &str, config: &ClassifierConfig) -> Result<RawImageData, ClassifierError> {
    log::info!("📝 开始处理 base64 图片");

    let bytes = parse_base64_with_limit(data, config.max_file_size)?;
    validate_image_signature(&bytes)?;

    Ok(RawImageData {
        bytes,
        source_hint: "base64",
    })
}

fn load_from_bytes(bytes: Vec<u8>, config: &ClassifierConfig) -> Result<RawImageData, ClassifierError> {
    if bytes.len() as u64 > config.max_file_size {
        return Err(ClassifierError::ResourceLimit(format!(
            "图片字节过大：{:.2} MB（限制：{:.2} MB）",
            bytes.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }
    validate_image_signature(&bytes)?;

    Ok(RawImageData {
        bytes,
        source_hint: "memory",
    })
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ClassifierError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ClassifierError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ClassifierError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, ClassifierError> {
    let normalized = data.trim();

    let base64_data = if normalized.starts_with("data:image/") {
        let base64_start = normalized
            .find(";base64,")
            .ok_or_else(|| ClassifierError::InvalidFormat("缺少 base64 标记".to_string()))?;
        &normalized[base64_start + 8..]
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(base64_data)?;
    if estimated_len > max_file_size {
        return Err(ClassifierError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| ClassifierError::Decode(format!("Base64 解码失败：{}", e)))
}

/// 通过文件签名（magic bytes）校验输入是否为图片。
fn validate_image_signature(bytes: &[u8]) -> Result<(), ClassifierError> {
    if bytes.is_empty() {
        return Err(ClassifierError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ClassifierError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ClassifierError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 解码原始字节为像素缓冲。
pub(crate) fn decode_raw_image(raw: RawImageData, config: &ClassifierConfig) -> Result<ImageBuffer, ClassifierError> {
    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| ClassifierError::Decode(format!("图片解码失败：{}", e)))?;
    validate_pixel_limits(config, decoded.width(), decoded.height())?;

    let buffer = ImageBuffer::from_dynamic_image(&decoded)?;

    log::info!(
        "✅ 图片解码成功 - 来源: {} 尺寸: {}x{} 格式: {:?}",
        raw.source_hint,
        buffer.width(),
        buffer.height(),
        buffer.format()
    );

    Ok(buffer)
}

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ClassifierError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ClassifierError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ClassifierError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &ClassifierConfig, width: u32, height: u32) -> Result<(), ClassifierError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ClassifierError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ClassifierError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::source::PixelFormat;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn bytes_source_decodes_gray_png() {
        let buffer = load_image(ImageSource::Bytes(png_bytes(40, 30)), &ClassifierConfig::default())
            .expect("decode png");
        assert_eq!((buffer.width(), buffer.height()), (40, 30));
        assert_eq!(buffer.format(), PixelFormat::Gray8);
        assert_eq!(buffer.pixel(3, 2), &[5]);
    }

    #[test]
    fn data_url_is_accepted() {
        let encoded = general_purpose::STANDARD.encode(png_bytes(8, 8));
        let data_url = format!("data:image/png;base64,{}", encoded);
        let buffer = load_image(ImageSource::Base64(data_url), &ClassifierConfig::default()).expect("decode");
        assert_eq!(buffer.width(), 8);
    }

    #[test]
    fn load_from_base64_rejects_non_image_payload() {
        let result = load_from_base64("SGVsbG8=", &ClassifierConfig::default());
        assert!(matches!(result, Err(ClassifierError::InvalidFormat(_))));
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = parse_base64_with_limit(&huge, 32);
        assert!(matches!(result, Err(ClassifierError::ResourceLimit(_))));
    }

    #[test]
    fn missing_file_is_a_file_system_error() {
        let result = load_image(
            ImageSource::FilePath("/definitely/not/here/digit.png".to_string()),
            &ClassifierConfig::default(),
        );
        assert!(matches!(result, Err(ClassifierError::FileSystem(_))));
    }

    #[test]
    fn too_many_pixels_are_rejected_before_decode() {
        let mut config = ClassifierConfig::default();
        config.max_decoded_pixels = 100;
        let result = load_image(ImageSource::Bytes(png_bytes(20, 20)), &config);
        assert!(matches!(result, Err(ClassifierError::ResourceLimit(_))));
    }

    #[test]
    fn oversized_bytes_are_rejected() {
        let mut config = ClassifierConfig::default();
        config.max_file_size = 16;
        let result = load_image(ImageSource::Bytes(png_bytes(20, 20)), &config);
        assert!(matches!(result, Err(ClassifierError::ResourceLimit(_))));
    }

    #[test]
    fn file_source_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("digit-classifier-loader-{}.png", std::process::id()));
        std::fs::write(&path, png_bytes(12, 12)).expect("write temp png");

        let result = load_image(
            ImageSource::FilePath(path.to_string_lossy().to_string()),
            &ClassifierConfig::default(),
        );
        let _ = std::fs::remove_file(&path);

        let buffer = result.expect("decode file");
        assert_eq!((buffer.width(), buffer.height()), (12, 12));
    }
}
