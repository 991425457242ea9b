use std::path::Path;

use tokio::fs;

use crate::error::{AppError, AppResult};
use crate::models::spec::BatchSpec;

/// 从 JSON 或 TOML 文件加载批量配置（按扩展名区分）
///
/// 读取、解析或校验失败都返回配置错误，调用方应在启动 worker 前退出。
pub async fn load_batch_spec(path: &Path) -> AppResult<BatchSpec> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::config(format!("无法读取配置文件 {}: {}", path.display(), e)))?;

    let spec: BatchSpec = if is_toml(path) {
        toml::from_str(&content)
            .map_err(|e| AppError::config(format!("无法解析TOML文件 {}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("无法解析JSON文件 {}: {}", path.display(), e)))?
    };

    spec.validate()?;
    tracing::info!(
        "成功加载配置: {} (jobs={}, topics={}, combos={})",
        path.display(),
        spec.jobs.len(),
        spec.topics.len(),
        spec.combos.len()
    );
    Ok(spec)
}

/// 将批量配置写为 JSON（plan 系列命令的输出）
pub async fn save_batch_spec(spec: &BatchSpec, path: &Path) -> AppResult<()> {
    let json = serde_json::to_string_pretty(spec)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::file(parent, e))?;
    }
    fs::write(path, json)
        .await
        .map_err(|e| AppError::file(path, e))?;
    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}
