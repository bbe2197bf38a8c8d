//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载分类链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! ## 错误分级
//!
//! - 本地可恢复错误（格式 / 形状 / 越界）：中止本次分类并返回失败，不会导致进程崩溃。
//! - `ModelLoad`：致命错误，模型形状不符时整个应用无法工作。
//! - `Inference`：瞬时错误，作为“预测失败”呈现给用户，不自动重试（输入不变，重试无意义）。

/// 分类流水线统一错误类型。
///
/// 该类型会在应用层被上转为 `AppError`。
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("内存分配失败：{0}")]
    Allocation(String),

    #[error("不支持的像素格式：{0}")]
    UnsupportedFormat(String),

    #[error("裁剪区域越界：{0}")]
    Bounds(String),

    #[error("尺寸不匹配：{0}")]
    ShapeMismatch(String),

    #[error("模型加载失败：{0}")]
    ModelLoad(String),

    #[error("推理失败：{0}")]
    Inference(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("配置错误：{0}")]
    Config(String),
}

impl ClassifierError {
    /// 稳定的机器可读错误码，供日志与上层展示使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Allocation(_) => "allocation",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Bounds(_) => "bounds",
            Self::ShapeMismatch(_) => "shape_mismatch",
            Self::ModelLoad(_) => "model_load",
            Self::Inference(_) => "inference",
            Self::FileSystem(_) => "file_system",
            Self::InvalidFormat(_) => "invalid_format",
            Self::Decode(_) => "decode",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Config(_) => "config",
        }
    }

    /// 错误发生的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::FileSystem(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "load",
            Self::Decode(_) => "decode",
            Self::Allocation(_) | Self::UnsupportedFormat(_) | Self::Bounds(_) => "prepare",
            Self::ShapeMismatch(_) => "encode",
            Self::ModelLoad(_) => "model",
            Self::Inference(_) => "infer",
            Self::Network(_) | Self::Timeout(_) => "upload",
            Self::Config(_) => "config",
        }
    }

    /// 是否为不可恢复的启动期错误。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad(_))
    }
}
