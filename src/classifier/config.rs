//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ClassifierConfig`，保证运行时行为可观测、可调整、可测试。
//! 模型输入约定（`ModelInputDescriptor`）与重采样档位（quality / balanced / speed）
//! 都在这里定义，档位作为高层语义映射到底层滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供与 MNIST 模型匹配的生产配置（28x28、单通道、0.0~1.0 归一化、float32）。
//! - `ResizeProfile` 负责档位字符串解析与反向输出。
//! - 配置可经 serde 序列化为 JSON，由 `settings` 模块负责读写文件。

use fast_image_resize as fr;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ClassifierError;

/// 模型输入约定：固定形状与数值策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInputDescriptor {
    pub width: u32,
    pub height: u32,
    /// 1 = 灰度，3 = RGB。
    pub channels: u32,
    /// true：0.0~1.0；false：0.0~255.0（仅在非量化时生效）。
    pub normalized: bool,
    /// true：模型接收 u8 原始样本。
    pub quantized: bool,
}

impl Default for ModelInputDescriptor {
    fn default() -> Self {
        Self {
            width: 28,
            height: 28,
            channels: 1,
            normalized: true,
            quantized: false,
        }
    }
}

impl ModelInputDescriptor {
    /// 模型声明的输入形状 `[batch, height, width, channels]`。
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, self.channels as usize]
    }

    /// 输入张量样本数（`width * height * channels`）。
    pub fn sample_count(&self) -> Result<usize, ClassifierError> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(self.channels as usize))
            .ok_or_else(|| ClassifierError::Allocation("输入张量尺寸溢出".to_string()))
    }
}

/// 重采样滤镜，对应 `image::imageops::FilterType`，额外支持 serde。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    pub(crate) fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }

    /// `Nearest` 映射为 Box 卷积（面积平均），保证缩小时不丢笔画。
    pub(crate) fn to_fast_filter(self) -> fr::FilterType {
        match self {
            Self::Nearest => fr::FilterType::Box,
            Self::Triangle => fr::FilterType::Bilinear,
            Self::CatmullRom => fr::FilterType::CatmullRom,
            Self::Gaussian => fr::FilterType::Mitchell,
            Self::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }
}

/// 分类器配置。
///
/// 字段覆盖了加载、预处理、后处理与服务端上传四个阶段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 模型输入约定。
    pub input: ModelInputDescriptor,
    /// 输出类别数（数字 0~9）。
    pub num_categories: usize,
    /// 降采样滤镜策略。
    pub resize_filter: ResizeFilter,
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 模型文件路径（设备端推理使用）。
    pub model_path: Option<String>,
    /// 推理线程数。
    pub intra_threads: usize,
    /// 服务端预测接口。
    pub upload_endpoint: String,
    /// 上传请求总超时（秒）。
    pub upload_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input: ModelInputDescriptor::default(),
            num_categories: 10,
            resize_filter: ResizeFilter::Triangle,
            max_file_size: 20 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            model_path: None,
            intra_threads: 1,
            upload_endpoint: "http://127.0.0.1:5000/mnist".to_string(),
            upload_timeout: 30,
            connect_timeout: 8,
        }
    }
}

/// 重采样档位（面向用户语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与性能平衡
/// - `Speed`：优先速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeProfile {
    Quality,
    Balanced,
    Speed,
}

impl ResizeProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use digit_classifier::classifier::ResizeProfile;
    ///
    /// let p = ResizeProfile::parse("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), digit_classifier::classifier::ClassifierError>(())
    /// ```
    pub fn parse(profile: &str) -> Result<Self, ClassifierError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ClassifierError::Config(format!(
                "未知重采样档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl ClassifierConfig {
    /// 基于当前滤镜反推档位。
    pub fn infer_resize_profile(&self) -> ResizeProfile {
        match self.resize_filter {
            ResizeFilter::CatmullRom | ResizeFilter::Lanczos3 => ResizeProfile::Quality,
            ResizeFilter::Nearest => ResizeProfile::Speed,
            ResizeFilter::Triangle | ResizeFilter::Gaussian => ResizeProfile::Balanced,
        }
    }

    /// 应用指定档位到实际滤镜。
    pub fn apply_resize_profile(&mut self, profile: ResizeProfile) {
        self.resize_filter = match profile {
            ResizeProfile::Quality => ResizeFilter::Lanczos3,
            ResizeProfile::Balanced => ResizeFilter::Triangle,
            ResizeProfile::Speed => ResizeFilter::Nearest,
        };
    }

    /// 校验配置组合是否可用。
    ///
    /// 文件读取或命令行覆盖之后调用，尽早拒绝无效参数。
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.input.width == 0 || self.input.height == 0 {
            return Err(ClassifierError::Config("模型输入宽高必须为正".to_string()));
        }
        if !matches!(self.input.channels, 1 | 3) {
            return Err(ClassifierError::Config(format!(
                "模型输入通道数只支持 1 或 3，当前：{}",
                self.input.channels
            )));
        }
        if self.num_categories == 0 {
            return Err(ClassifierError::Config("num_categories 不能为 0".to_string()));
        }
        if self.max_file_size < 1024 {
            return Err(ClassifierError::Config("max_file_size 不能小于 1KB".to_string()));
        }
        if self.intra_threads == 0 {
            return Err(ClassifierError::Config("intra_threads 不能为 0".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ClassifierError::Config("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(1..=600).contains(&self.upload_timeout) {
            return Err(ClassifierError::Config("upload_timeout 必须在 1~600 秒之间".to_string()));
        }
        if !self.upload_endpoint.starts_with("http://") && !self.upload_endpoint.starts_with("https://") {
            return Err(ClassifierError::Config(format!(
                "upload_endpoint 必须是 http(s) 地址：{}",
                self.upload_endpoint
            )));
        }
        Ok(())
    }
}
