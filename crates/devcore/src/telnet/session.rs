//! 裝置 shell 的 Telnet Session
//!
//! shell 輸出沒有訊息邊界，一個命令的回應以「裝置安靜下來」為結束：
//! 連續讀取，直到一段閒置時間內沒有新資料。

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, trace, warn};

use super::error::{ErrorKind, TelnetError, WriteError};
use super::transport::{
    Chunk, Connector, Payload, ShutdownStyle, TcpConnector, Transport, TransportMode,
};
use crate::address::is_valid_ip;
use crate::config::SessionConfig;
use crate::encoding::StreamDecoder;

/// 命令結尾
pub const LINE_ENDING: &str = "\r\n";

/// [`Session::scoped`] 的主體回傳的 future
pub type ScopedFuture<'s, T> = Pin<Box<dyn Future<Output = Result<T, TelnetError>> + Send + 's>>;

/// 連線狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 與單一裝置 shell 的 Telnet 連線
///
/// 讀取端與寫入端是同一個 [`Transport`]，兩者同時存在或同時為空。
/// 所有操作都需要 `&mut self`；多個 task 共用時請使用
/// [`SharedSession`](super::SharedSession)。
pub struct Session<C: Connector = TcpConnector> {
    host: String,
    port: u16,
    config: SessionConfig,
    connector: C,
    transport: Option<C::Transport>,
    mode: Option<TransportMode>,
    state: ConnectionState,
    connected_at: Option<Instant>,
    disconnected_at: Option<Instant>,
}

impl Session<TcpConnector> {
    /// 以 TCP 連線建立 Session
    ///
    /// `host` 必須是 IP 位址；主機名稱會立即回傳 [`TelnetError::InvalidHost`]。
    pub fn new(host: &str, config: SessionConfig) -> Result<Self, TelnetError> {
        let connector = TcpConnector::new(config.transport_encoding()?);
        Self::with_connector(host, config, connector)
    }
}

impl<C: Connector> Session<C> {
    /// 使用自訂的 [`Connector`] 建立 Session
    pub fn with_connector(host: &str, config: SessionConfig, connector: C) -> Result<Self, TelnetError> {
        if !is_valid_ip(host) {
            return Err(TelnetError::InvalidHost(host.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port: config.port,
            config,
            connector,
            transport: None,
            mode: None,
            state: ConnectionState::Disconnected,
            connected_at: None,
            disconnected_at: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 連線時協商出的傳輸模式
    pub fn mode(&self) -> Option<TransportMode> {
        self.mode
    }

    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn disconnected_at(&self) -> Option<Instant> {
        self.disconnected_at
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// 已連線且寫入端沒有在關閉
    pub fn is_healthy(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_closing())
    }

    /// 連線到裝置
    ///
    /// 已連線時不做任何事。`connect_timeout` 為 `None` 時使用設定值。
    pub async fn connect(&mut self, connect_timeout: Option<Duration>) -> Result<(), TelnetError> {
        if self.is_connected() {
            debug!("已連線到 {}:{}，略過", self.host, self.port);
            return Ok(());
        }

        let limit = connect_timeout.unwrap_or(self.config.connect_timeout);
        self.state = ConnectionState::Connecting;
        info!("正在連線到 {}:{}", self.host, self.port);

        let result = timeout(limit, self.connector.connect(&self.host, self.port)).await;
        let transport = match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                self.mark_disconnected();
                return Err(TelnetError::from_io(
                    format_args!("無法連線到 {}:{}", self.host, self.port),
                    e,
                ));
            }
            Err(_) => {
                self.mark_disconnected();
                return Err(TelnetError::connection(
                    ErrorKind::Timeout,
                    format!("連線到 {}:{} 逾時（{:?}）", self.host, self.port, limit),
                ));
            }
        };

        let mode = transport.mode();
        info!("已連線到 {}:{}（{:?} 模式）", self.host, self.port, mode);
        self.transport = Some(transport);
        self.mode = Some(mode);
        self.state = ConnectionState::Connected;
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    /// 斷開連線
    ///
    /// 關閉過程的錯誤只記錄不回傳；結束時一定處於未連線狀態。
    pub async fn disconnect(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        transport.close();
        match transport.shutdown_style() {
            ShutdownStyle::WaitClosed => {
                match timeout(self.config.close_timeout, transport.wait_closed()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("關閉連線時發生錯誤: {}", e),
                    Err(_) => warn!("等待連線關閉逾時"),
                }
            }
            ShutdownStyle::GraceDelay => sleep(self.config.close_grace).await,
        }

        drop(transport);
        self.mark_disconnected();
        info!("已斷開與 {}:{} 的連線", self.host, self.port);
    }

    fn mark_disconnected(&mut self) {
        self.transport = None;
        self.mode = None;
        self.state = ConnectionState::Disconnected;
        self.disconnected_at = Some(Instant::now());
    }

    /// 讀取直到裝置閒置 `read_timeout`
    ///
    /// 閒置逾時是正常結束，回傳累積的輸出（可能為空）。遠端關閉或
    /// 連線中斷時會標記為未連線並回傳已收到的部分，不回傳錯誤。
    pub async fn read_until_timeout(&mut self, read_timeout: Duration) -> Result<String, TelnetError> {
        let chunk_size = self.config.chunk_size;
        let transport = self.transport.as_mut().ok_or_else(TelnetError::not_connected)?;

        let mut decoder = StreamDecoder::utf8();
        let mut output = String::new();
        let mut lost = false;

        loop {
            match timeout(read_timeout, transport.read_chunk(chunk_size)).await {
                Err(_) => {
                    trace!("閒置 {:?}，結束讀取", read_timeout);
                    break;
                }
                Ok(Ok(chunk)) if chunk.is_empty() => {
                    info!("遠端已關閉連線");
                    lost = true;
                    break;
                }
                Ok(Ok(Chunk::Bytes(bytes))) => decoder.decode(&bytes, &mut output),
                Ok(Ok(Chunk::Text(text))) => output.push_str(&text),
                Ok(Err(e)) => {
                    warn!("讀取中斷，回傳已收到的 {} 位元組: {}", output.len(), e);
                    lost = true;
                    break;
                }
            }
        }
        decoder.finish(&mut output);

        if lost {
            self.mark_disconnected();
        }
        Ok(output)
    }

    /// 執行一行 shell 命令並回傳裝置輸出
    ///
    /// `command` 不含換行；回傳的文字包含命令回顯與提示字元，解析由呼叫端負責。
    /// 可恢復的連線錯誤會重連並以指數退避重試，最多 `max_attempts` 次。
    ///
    /// 注意：沒有整體期限。裝置若持續以短於閒置逾時的間隔輸出，
    /// 這個呼叫就會一直讀下去。
    pub async fn send_command(
        &mut self,
        command: &str,
        read_timeout: Option<Duration>,
    ) -> Result<String, TelnetError> {
        let read_timeout = read_timeout.unwrap_or(self.config.read_timeout);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.attempt_command(command, read_timeout).await {
                Ok(response) => {
                    debug!("命令 {:?} 回應 {} 字元", command, response.len());
                    return Ok(response);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("命令 {:?} 第 {}/{} 次失敗: {}", command, attempt + 1, attempts, e);
                    self.disconnect().await;

                    if attempt + 1 < attempts {
                        let delay = self.backoff(attempt);
                        debug!("{:?} 後重試", delay);
                        sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("命令 {:?} 失敗，不重試: {}", command, e);
                    return Err(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(TelnetError::not_connected);
        Err(TelnetError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .retry_base_delay
            .saturating_mul(1u32 << attempt.min(16))
    }

    async fn attempt_command(&mut self, command: &str, read_timeout: Duration) -> Result<String, TelnetError> {
        self.ensure_connected().await?;

        let line = format!("{command}{LINE_ENDING}");
        self.write_line(&line)?;

        let transport = self.transport.as_mut().ok_or_else(TelnetError::not_connected)?;
        transport
            .drain()
            .await
            .map_err(|e| TelnetError::from_io("送出命令失敗", e))?;

        let response = self.read_until_timeout(read_timeout).await?;

        // 連線正常時空回應是合法的（命令本身沒有輸出）
        if response.is_empty() && !self.is_healthy() {
            return Err(TelnetError::connection(
                ErrorKind::RemoteClosed,
                "回應為空且連線已中斷",
            ));
        }
        Ok(response)
    }

    /// 確認連線可用；必要時重連並排空登入提示
    async fn ensure_connected(&mut self) -> Result<(), TelnetError> {
        if self.is_healthy() {
            return Ok(());
        }

        if self.is_connected() {
            debug!("寫入端正在關閉，重新建立連線");
        }
        self.disconnect().await;
        self.connect(None).await?;

        let banner = self.read_until_timeout(self.config.initial_read_timeout).await?;
        debug!("丟棄登入提示: {:?}", banner);
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), TelnetError> {
        let mode = self.mode.unwrap_or(TransportMode::Bytes);
        let transport = self.transport.as_mut().ok_or_else(TelnetError::not_connected)?;

        let first = match mode {
            TransportMode::Text => transport.write(Payload::Text(line)),
            TransportMode::Bytes => transport.write(Payload::Bytes(line.as_bytes())),
        };

        match first {
            Ok(()) => Ok(()),
            Err(WriteError::NeedsBytes) if mode == TransportMode::Text => {
                debug!("傳輸層要求位元組資料，改送 UTF-8 位元組");
                transport
                    .write(Payload::Bytes(line.as_bytes()))
                    .map_err(write_failure)
            }
            Err(e) => Err(write_failure(e)),
        }
    }

    /// 連線後執行 `body`，結束時（無論成功或失敗）一定斷線
    ///
    /// ```no_run
    /// # async fn run() -> Result<(), devcore::TelnetError> {
    /// use devcore::{Session, SessionConfig};
    ///
    /// let mut session = Session::new("192.168.1.20", SessionConfig::default())?;
    /// let version = session
    ///     .scoped(|s| Box::pin(async move { s.send_command("cat /etc/version", None).await }))
    ///     .await?;
    /// println!("{version}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, F>(&mut self, body: F) -> Result<T, TelnetError>
    where
        F: for<'s> FnOnce(&'s mut Self) -> ScopedFuture<'s, T>,
    {
        self.connect(None).await?;
        let result = body(self).await;
        self.disconnect().await;
        result
    }
}

fn write_failure(err: WriteError) -> TelnetError {
    match err {
        WriteError::Io(e) => TelnetError::from_io("寫入失敗", e),
        other => TelnetError::connection(ErrorKind::Fatal, other.to_string()),
    }
}
