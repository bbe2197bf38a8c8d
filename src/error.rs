//! 应用级错误类型模块
//!
//! # 设计思路
//!
//! 流水线内部统一使用 `ClassifierError`；命令行入口还会碰到文件 I/O、
//! 配置文件与参数解析错误。`AppError` 把它们收拢到一个类型里，
//! `main` 只需处理一种错误即可决定提示文案与退出码。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ClassifierError` 与 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - `is_fatal` 透传模型加载失败这类不可恢复错误。

use crate::classifier::ClassifierError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 识别流水线错误（加载 / 预处理 / 推理 / 上传）
    #[error("{0}")]
    Classifier(#[from] ClassifierError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件读写失败
    #[error("配置文件错误: {0}")]
    Settings(String),

    /// 命令行参数无效
    #[error("参数错误: {0}")]
    Cli(String),
}

impl AppError {
    /// 是否为不可恢复错误（应终止进程而非提示重试）。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Classifier(e) if e.is_fatal())
    }
}
