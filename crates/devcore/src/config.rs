//! Session 設定
//!
//! 以 JSON 儲存；時間欄位以秒（可含小數）表示

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::resolve_encoding;
use crate::telnet::TelnetError;

/// Telnet 預設連接埠
pub const DEFAULT_PORT: u16 = 23;

/// 設定檔錯誤
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] io::Error),

    #[error("設定檔格式錯誤: {0}")]
    Json(#[from] serde_json::Error),
}

/// 單一 Session 的連線與重試設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 連接埠
    pub port: u16,
    /// 建立連線的逾時
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// 讀取回應時的閒置逾時
    #[serde(with = "secs")]
    pub read_timeout: Duration,
    /// 重連後排空登入提示的閒置逾時
    #[serde(with = "secs")]
    pub initial_read_timeout: Duration,
    /// 每個命令最多嘗試次數（含第一次）
    pub max_attempts: u32,
    /// 重試退避的基礎時間，每次加倍
    #[serde(with = "secs")]
    pub retry_base_delay: Duration,
    /// 寫入端沒有關閉完成信號時的等待時間
    #[serde(with = "secs")]
    pub close_grace: Duration,
    /// 等待關閉完成的上限
    #[serde(with = "secs")]
    pub close_timeout: Duration,
    /// 每次讀取的最大區塊大小
    pub chunk_size: usize,
    /// 傳輸編碼；`None` 時使用位元組模式
    pub encoding: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(1),
            initial_read_timeout: Duration::from_millis(500),
            max_attempts: 2,
            retry_base_delay: Duration::from_secs(1),
            close_grace: Duration::from_millis(100),
            close_timeout: Duration::from_secs(5),
            chunk_size: 4096,
            encoding: Some("utf-8".to_string()),
        }
    }
}

impl SessionConfig {
    /// 從 JSON 檔案載入
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 儲存為 JSON 檔案
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 解析設定的編碼
    pub fn transport_encoding(&self) -> Result<Option<&'static Encoding>, TelnetError> {
        match self.encoding.as_deref() {
            None => Ok(None),
            Some(label) => resolve_encoding(label)
                .map(Some)
                .ok_or_else(|| TelnetError::UnsupportedEncoding(label.to_string())),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
