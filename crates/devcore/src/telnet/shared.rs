//! 多個 task 共用的 Session
//!
//! 同一條 shell 連線上的命令必須一問一答，交錯送出會讓閒置判斷讀到
//! 別人的回應。這裡以互斥鎖包住完整的一次命令/回應週期。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use super::error::TelnetError;
use super::session::Session;
use super::transport::{Connector, TcpConnector};

/// 可複製、可跨 task 使用的 [`Session`]
pub struct SharedSession<C: Connector = TcpConnector> {
    inner: Arc<Mutex<Session<C>>>,
}

impl<C: Connector> SharedSession<C> {
    pub fn new(session: Session<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// 執行命令；鎖會持有到回應讀完為止
    pub async fn send_command(
        &self,
        command: &str,
        read_timeout: Option<Duration>,
    ) -> Result<String, TelnetError> {
        let mut session = self.inner.lock().await;
        session.send_command(command, read_timeout).await
    }

    pub async fn connect(&self, connect_timeout: Option<Duration>) -> Result<(), TelnetError> {
        self.inner.lock().await.connect(connect_timeout).await
    }

    pub async fn disconnect(&self) {
        self.inner.lock().await.disconnect().await;
    }

    /// 取得獨占存取，用於需要連續多個命令的流程
    pub async fn lock(&self) -> MutexGuard<'_, Session<C>> {
        self.inner.lock().await
    }
}

impl<C: Connector> Clone for SharedSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
