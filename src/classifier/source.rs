//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示编码图片的来源语义（文件 / Base64 / 内存字节）
//! - `RawImageData` 表示已加载但未解码的字节
//! - `ImageBuffer` 表示平台像素缓冲（任意格式、任意尺寸、允许行填充）
//! - `VisionInput` 是唯一入口的标签变体，进入适配器前统一归一化为 `ImageBuffer`
//!
//! 像素缓冲由调用方持有，流水线只读不写；每次采集都返回新值，不保留全局缓冲字段。

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::ClassifierError;

/// 图片输入来源。
pub enum ImageSource {
    /// 本地文件路径来源。
    FilePath(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 已在内存中的编码字节（PNG / JPEG 等）。
    Bytes(Vec<u8>),
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 支持的像素格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 单通道 8 位灰度。
    Gray8,
    /// 三通道 RGB。
    Rgb8,
    /// 四通道，alpha 在末尾。
    Rgba8,
    /// 四通道，小端平台常见的 BGRA。
    Bgra8,
    /// 四通道，alpha 在首位。
    Argb8,
}

const FOUR_CC_ONE_COMPONENT_8: u32 = u32::from_be_bytes(*b"L008");
const FOUR_CC_24_RGB: u32 = 0x0000_0018;
const FOUR_CC_32_ARGB: u32 = 0x0000_0020;
const FOUR_CC_32_BGRA: u32 = u32::from_be_bytes(*b"BGRA");
const FOUR_CC_32_RGBA: u32 = u32::from_be_bytes(*b"RGBA");

impl PixelFormat {
    /// 每像素通道数（等同于字节数）。
    pub fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Bgra8 | Self::Argb8 => 4,
        }
    }

    /// R/G/B 分量在单个像素内的字节偏移；灰度格式返回 `None`。
    pub(crate) fn rgb_offsets(self) -> Option<[usize; 3]> {
        match self {
            Self::Gray8 => None,
            Self::Rgb8 | Self::Rgba8 => Some([0, 1, 2]),
            Self::Bgra8 => Some([2, 1, 0]),
            Self::Argb8 => Some([1, 2, 3]),
        }
    }

    /// 从平台像素格式码（FourCC）识别格式。
    pub fn from_four_cc(code: u32) -> Result<Self, ClassifierError> {
        match code {
            FOUR_CC_ONE_COMPONENT_8 => Ok(Self::Gray8),
            FOUR_CC_24_RGB => Ok(Self::Rgb8),
            FOUR_CC_32_ARGB => Ok(Self::Argb8),
            FOUR_CC_32_BGRA => Ok(Self::Bgra8),
            FOUR_CC_32_RGBA => Ok(Self::Rgba8),
            other => Err(ClassifierError::UnsupportedFormat(format!(
                "未知像素格式码：0x{:08X}",
                other
            ))),
        }
    }
}

/// 平台像素缓冲。
///
/// 行与行之间允许存在填充字节（`bytes_per_row >= width * channels`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_row: usize,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// 创建紧凑排列（无行填充）的缓冲。
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, ClassifierError> {
        let bytes_per_row = (width as usize)
            .checked_mul(format.channels())
            .ok_or_else(|| ClassifierError::Allocation("行字节数溢出".to_string()))?;
        Self::with_row_bytes(width, height, format, bytes_per_row, data)
    }

    /// 创建带行填充的缓冲。
    pub fn with_row_bytes(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes_per_row: usize,
        data: Vec<u8>,
    ) -> Result<Self, ClassifierError> {
        if width == 0 || height == 0 {
            return Err(ClassifierError::ShapeMismatch(format!(
                "像素缓冲尺寸必须为正：{}x{}",
                width, height
            )));
        }

        let packed_row = (width as usize)
            .checked_mul(format.channels())
            .ok_or_else(|| ClassifierError::Allocation("行字节数溢出".to_string()))?;
        if bytes_per_row < packed_row {
            return Err(ClassifierError::ShapeMismatch(format!(
                "行字节数过小：{}（至少 {}）",
                bytes_per_row, packed_row
            )));
        }

        let expected_len = bytes_per_row
            .checked_mul(height as usize)
            .ok_or_else(|| ClassifierError::Allocation("像素缓冲长度溢出".to_string()))?;
        if data.len() < expected_len {
            return Err(ClassifierError::ShapeMismatch(format!(
                "像素数据长度不足：{}（期望 {}）",
                data.len(),
                expected_len
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            bytes_per_row,
            data,
        })
    }

    /// 从已解码图片构建缓冲。
    ///
    /// 8 位灰度 / RGB / RGBA 原样保留，其余格式统一转换为 RGBA8。
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self, ClassifierError> {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(buf) => Self::new(width, height, PixelFormat::Gray8, buf.as_raw().clone()),
            DynamicImage::ImageRgb8(buf) => Self::new(width, height, PixelFormat::Rgb8, buf.as_raw().clone()),
            DynamicImage::ImageRgba8(buf) => Self::new(width, height, PixelFormat::Rgba8, buf.as_raw().clone()),
            other => Self::new(width, height, PixelFormat::Rgba8, other.to_rgba8().into_raw()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// 第 `y` 行的有效像素字节（不含行填充）。调用方保证 `y < height`。
    pub(crate) fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.bytes_per_row;
        let len = self.width as usize * self.format.channels();
        &self.data[start..start + len]
    }

    /// `(x, y)` 处单个像素的全部通道。调用方保证坐标在缓冲内。
    pub(crate) fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.format.channels();
        let start = x as usize * channels;
        &self.row(y)[start..start + channels]
    }

    /// 覆盖整个缓冲的区域。
    pub fn full_region(&self) -> CropRegion {
        CropRegion {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// 是否为紧凑排列。
    pub fn is_packed(&self) -> bool {
        self.bytes_per_row == self.width as usize * self.format.channels()
    }

    /// 紧凑排列的全部像素字节，内存不足时返回 `Allocation`。
    pub fn to_packed_vec(&self) -> Result<Vec<u8>, ClassifierError> {
        let row_len = self.width as usize * self.format.channels();
        let mut out = Vec::new();
        out.try_reserve_exact(row_len * self.height as usize)
            .map_err(|e| ClassifierError::Allocation(format!("无法分配像素副本：{}", e)))?;

        if self.is_packed() {
            out.extend_from_slice(&self.data[..row_len * self.height as usize]);
        } else {
            for y in 0..self.height {
                out.extend_from_slice(self.row(y));
            }
        }
        Ok(out)
    }
}

/// 源像素坐标系下的轴对齐矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// 居中正方形（边长 = min(width, height)）。
    pub fn square_aspect_fill(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
        }
    }
}

/// 裁剪策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropArea {
    /// 使用整个缓冲，不裁剪。
    Full,
    /// 居中最大正方形。
    #[default]
    SquareAspectFill,
    /// 调用方指定的矩形。
    Custom(CropRegion),
}

impl CropArea {
    /// 针对给定缓冲解析出具体矩形。
    pub fn resolve(&self, buffer: &ImageBuffer) -> CropRegion {
        match self {
            Self::Full => buffer.full_region(),
            Self::SquareAspectFill => CropRegion::square_aspect_fill(buffer.width(), buffer.height()),
            Self::Custom(region) => *region,
        }
    }
}

/// 统一入口的输入变体。
pub enum VisionInput {
    /// 平台像素缓冲。
    RawBuffer(ImageBuffer),
    /// 已解码图片。
    DecodedImage(DynamicImage),
}

impl VisionInput {
    /// 归一化为单一的缓冲表示。
    pub fn into_buffer(self) -> Result<ImageBuffer, ClassifierError> {
        match self {
            Self::RawBuffer(buffer) => Ok(buffer),
            Self::DecodedImage(image) => ImageBuffer::from_dynamic_image(&image),
        }
    }
}

/// 后处理参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostprocessOptions {
    pub num_categories: usize,
}

impl Default for PostprocessOptions {
    fn default() -> Self {
        Self { num_categories: 10 }
    }
}

/// 一次分类请求。
pub struct ClassificationInput {
    pub source: VisionInput,
    pub crop_area: CropArea,
    /// `None` 时使用分类器配置中的 `num_categories`。
    pub postprocess: Option<PostprocessOptions>,
}

impl ClassificationInput {
    /// 使用默认裁剪策略（居中正方形），后处理参数跟随分类器配置。
    pub fn new(source: VisionInput) -> Self {
        Self {
            source,
            crop_area: CropArea::default(),
            postprocess: None,
        }
    }

    pub fn with_crop_area(mut self, crop_area: CropArea) -> Self {
        self.crop_area = crop_area;
        self
    }

    pub fn with_postprocess(mut self, postprocess: PostprocessOptions) -> Self {
        self.postprocess = Some(postprocess);
        self
    }
}
