//! 執行設定（環境變數）

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use leveling_core::LevelingConfig;
use leveling_orchestrator::RunInputs;

/// 執行設定
#[derive(Debug, Clone)]
pub struct Settings {
    /// 平準化配置檔（JSON）
    pub config_path: PathBuf,

    /// 輸入快照檔（JSON），未設定時由呼叫端提供
    pub inputs_path: Option<PathBuf>,

    /// 預設日誌過濾條件
    pub log_filter: String,
}

impl Settings {
    /// 從環境變數載入
    ///
    /// - `LEVELING_CONFIG`：配置檔路徑（預設 `leveling.json`）
    /// - `LEVELING_INPUTS`：輸入快照檔路徑
    /// - `LEVELING_LOG`：日誌過濾條件（預設 `info`）
    pub fn from_env() -> Self {
        let config_path = std::env::var("LEVELING_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("leveling.json"));

        let inputs_path = std::env::var("LEVELING_INPUTS").ok().map(PathBuf::from);

        let log_filter = std::env::var("LEVELING_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            config_path,
            inputs_path,
            log_filter,
        }
    }
}

/// 讀取並驗證平準化配置
pub fn load_config(path: &Path) -> Result<LevelingConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("無法讀取配置檔 {}", path.display()))?;
    LevelingConfig::from_json_str(&json)
        .with_context(|| format!("配置檔 {} 格式錯誤", path.display()))
}

/// 讀取輸入快照
pub fn load_inputs(path: &Path) -> Result<RunInputs> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("無法讀取輸入檔 {}", path.display()))?;
    let inputs: RunInputs = serde_json::from_str(&json)
        .with_context(|| format!("輸入檔 {} 格式錯誤", path.display()))?;
    leveling_orchestrator::validate_inputs(&inputs)
        .with_context(|| format!("輸入檔 {} 內容不完整", path.display()))?;
    Ok(inputs)
}
