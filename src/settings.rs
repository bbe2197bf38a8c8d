//! 配置文件读写。
//!
//! 配置以 JSON 保存；文件缺失或无法解析时回退到默认配置并记录警告，
//! 不让一个坏掉的配置文件挡住识别流程。

use std::fs;
use std::path::Path;

use crate::classifier::ClassifierConfig;
use crate::error::AppError;

/// 读取配置文件，失败时回退默认值。
pub fn load_config_from_path(path: &Path) -> ClassifierConfig {
    if !path.exists() {
        log::info!("⚙️ 配置文件不存在，使用默认配置：{}", path.display());
        return ClassifierConfig::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("⚙️ 已加载配置文件：{}", path.display());
            config
        }
        Err(e) => {
            log::warn!("⚠️ 配置文件不可用，使用默认配置：{}", e);
            ClassifierConfig::default()
        }
    }
}

fn read_config(path: &Path) -> Result<ClassifierConfig, AppError> {
    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str::<ClassifierConfig>(&content)
        .map_err(|e| AppError::Settings(format!("解析配置文件失败: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// 保存配置到文件（自动创建父目录）。
pub fn save_config_to_path(path: &Path, config: &ClassifierConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化配置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}
