//! 裝置端操作
//!
//! Session 回傳的是原始終端輸出（含回顯、提示字元、顏色碼），
//! 這裡提供常用的解析工具，以及測試腳本常用的裝置操作流程。

use std::borrow::Cow;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::telnet::{Connector, Session, TcpConnector, TelnetError};

/// 裝置上 busybox httpd 的預設連接埠
pub const DEFAULT_HTTP_PORT: u16 = 88;

/// 有 TF 卡時的圖片快取目錄
pub const CARD_PICTURE_DIR: &str = "/mnt/";

/// 沒有 TF 卡時的圖片快取目錄
pub const INTERNAL_PICTURE_DIR: &str = "/customer/";

lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI 正規表示式無效");
    static ref PROMPT_RE: Regex = Regex::new(r"^(?:[\w.-]+@[\w.-]+:?)?(?:[~/][^\s#$]*)?\s?[#$]\s*$").expect("提示字元正規表示式無效");
}

/// 移除 ANSI 控制序列（busybox ls 在終端上會輸出顏色）
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(text, "")
}

/// 是否為 shell 提示字元行，如 `/ #`、`# `、`~ $`、`root@screen:~#`
///
/// 只接受「路徑或 `user@host:路徑`」加上 `#`/`$` 的形狀，`a#`、`<config>` 不算。
pub fn is_prompt_line(line: &str) -> bool {
    PROMPT_RE.is_match(line.trim_end_matches(&['\r', '\n'][..]))
}

/// 移除回應開頭的命令回顯
pub fn strip_echo<'a>(response: &'a str, command: &str) -> &'a str {
    let command = command.trim();
    if command.is_empty() {
        return response;
    }

    let (first, rest) = match response.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (response, ""),
    };

    // 回顯行是命令本身，或提示字元後接命令
    let echoed = first
        .trim_end()
        .strip_suffix(command)
        .is_some_and(|prefix| prefix.is_empty() || is_prompt_line(prefix));
    if echoed {
        rest
    } else {
        response
    }
}

/// 去除回顯、顏色碼、空行與結尾提示字元後的輸出行
///
/// 只有最後一行會被當成提示字元檢查，中間的內容行一律保留。
///
/// # Example
/// ```
/// use devcore::device::output_lines;
///
/// let response = "ls /customer\r\npic1.jpg\r\npic2.jpg\r\n/ # ";
/// assert_eq!(output_lines(response, "ls /customer"), vec!["pic1.jpg", "pic2.jpg"]);
/// ```
pub fn output_lines(response: &str, command: &str) -> Vec<String> {
    let body = strip_echo(response, command);
    let mut lines: Vec<String> = strip_ansi(body)
        .lines()
        .map(|line| line.trim_end_matches('\r').trim_end())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if lines.last().is_some_and(|line| is_prompt_line(line)) {
        lines.pop();
    }
    lines
}

/// 取出 `key=value` 形式的值
///
/// # Example
/// ```
/// use devcore::device::value_after_equals;
///
/// let text = "model=S10\r\nversion = 2.1.0\r\n";
/// assert_eq!(value_after_equals(text, "version"), Some("2.1.0".to_string()));
/// assert_eq!(value_after_equals(text, "build"), None);
/// ```
pub fn value_after_equals(text: &str, key: &str) -> Option<String> {
    strip_ansi(text).lines().find_map(|line| {
        let rest = line.trim().strip_prefix(key)?;
        let value = rest.trim_start().strip_prefix('=')?;
        Some(value.trim().to_string())
    })
}

/// 只取出比上一次完整回應多出來的內容
///
/// 輪詢同一個命令時（例如 `cat` 一個持續增長的日誌），
/// 只把新增的部分交給下游。
#[derive(Debug, Clone, Default)]
pub struct OutputTracker {
    previous: String,
}

impl OutputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 回傳新增內容並記住這次的完整回應
    ///
    /// 若新回應不是以上一次回應開頭（例如日誌被輪替），回傳整個新回應。
    pub fn fresh(&mut self, full: &str) -> String {
        let new = full
            .strip_prefix(self.previous.as_str())
            .unwrap_or(full)
            .to_string();
        self.previous = full.to_string();
        new
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

/// 智慧屏裝置上的常用操作
///
/// TF 卡偵測結果快取在實例中，裝置插拔卡後需呼叫
/// [`Device::invalidate_cache`]。
pub struct Device<C: Connector = TcpConnector> {
    session: Session<C>,
    tf_card: Option<bool>,
}

impl<C: Connector> Device<C> {
    pub fn new(session: Session<C>) -> Self {
        Self {
            session,
            tf_card: None,
        }
    }

    pub fn session(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<C> {
        self.session
    }

    /// 執行命令並回傳整理過的輸出行
    pub async fn run(&mut self, command: &str) -> Result<Vec<String>, TelnetError> {
        let response = self.session.send_command(command, None).await?;
        Ok(output_lines(&response, command))
    }

    /// 讀取 `key=value` 格式檔案中的值（如版本檔）
    pub async fn read_value(&mut self, path: &str, key: &str) -> Result<Option<String>, TelnetError> {
        let command = format!("cat {path}");
        let response = self.session.send_command(&command, None).await?;
        Ok(value_after_equals(strip_echo(&response, &command), key))
    }

    /// 列出目錄內容
    pub async fn list_dir(&mut self, path: &str) -> Result<Vec<String>, TelnetError> {
        let lines = self.run(&format!("ls {path}")).await?;
        Ok(lines
            .iter()
            .filter(|line| !line.starts_with("ls:"))
            .flat_map(|line| line.split_whitespace())
            .map(str::to_string)
            .collect())
    }

    /// 輪詢目錄直到檔案出現
    ///
    /// 至少檢查一次；`attempts` 為 0 時視同 1。
    pub async fn wait_for_file(
        &mut self,
        dir: &str,
        name: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<bool, TelnetError> {
        let attempts = attempts.max(1);
        for attempt in 0..attempts {
            if self.list_dir(dir).await?.iter().any(|entry| entry == name) {
                debug!("{}{} 已出現（第 {} 次檢查）", dir, name, attempt + 1);
                return Ok(true);
            }
            if attempt + 1 < attempts {
                sleep(interval).await;
            }
        }
        Ok(false)
    }

    /// 裝置是否掛載 TF 卡（結果會快取）
    pub async fn has_tf_card(&mut self) -> Result<bool, TelnetError> {
        if let Some(cached) = self.tf_card {
            return Ok(cached);
        }

        let lines = self.run("cat /proc/mounts").await?;
        let mounted = lines.iter().any(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|mount_point| mount_point.starts_with(CARD_PICTURE_DIR))
        });
        info!("TF 卡: {}", if mounted { "已掛載" } else { "未掛載" });

        self.tf_card = Some(mounted);
        Ok(mounted)
    }

    /// 清除 TF 卡偵測快取
    pub fn invalidate_cache(&mut self) {
        self.tf_card = None;
    }

    /// 圖片快取所在目錄
    pub async fn picture_cache_dir(&mut self) -> Result<&'static str, TelnetError> {
        Ok(if self.has_tf_card().await? {
            CARD_PICTURE_DIR
        } else {
            INTERNAL_PICTURE_DIR
        })
    }

    /// 在日誌目錄打包，回傳壓縮檔路徑；逾時未出現時回傳 `None`
    pub async fn package_logs(
        &mut self,
        log_dir: &str,
        archive: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<Option<String>, TelnetError> {
        let log_dir = log_dir.trim_end_matches('/');
        self.session.send_command(&format!("cd {log_dir}"), None).await?;
        self.session
            .send_command(&format!("tar -czf {archive} *"), None)
            .await?;

        let dir = format!("{log_dir}/");
        if self.wait_for_file(&dir, archive, attempts, interval).await? {
            Ok(Some(format!("{dir}{archive}")))
        } else {
            warn!("{} 中沒有出現 {}", dir, archive);
            Ok(None)
        }
    }

    /// 啟動裝置上的 httpd，讓主機可以用 HTTP 取回檔案
    pub async fn start_http_server(&mut self, port: u16) -> Result<(), TelnetError> {
        let command = format!("httpd -p {port}");
        let lines = self.run(&command).await?;
        if let Some(problem) = lines.iter().find(|line| line.contains("not found")) {
            warn!("httpd 啟動失敗: {}", problem);
        }
        Ok(())
    }
}
