//! Telnet 連線錯誤

use std::fmt;
use std::io;

use thiserror::Error;

/// 連線錯誤分類
///
/// 由產生錯誤的位置明確設定，重試策略只看分類，不解析錯誤訊息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 連線或讀寫逾時
    Timeout,
    /// 對方拒絕連線
    Refused,
    /// 傳輸被中斷（reset/abort）
    Aborted,
    /// 遠端已關閉連線
    RemoteClosed,
    /// 尚未連線或寫入端正在關閉
    NotConnected,
    /// 無法恢復的錯誤
    Fatal,
}

impl ErrorKind {
    /// 此類錯誤是否值得重連後重試
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Aborted | Self::RemoteClosed | Self::NotConnected
        )
    }

    /// 依 I/O 錯誤種類分類
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Self::Aborted,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Self::RemoteClosed,
            io::ErrorKind::NotConnected => Self::NotConnected,
            _ => Self::Fatal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "逾時",
            Self::Refused => "連線被拒",
            Self::Aborted => "連線中斷",
            Self::RemoteClosed => "遠端已關閉",
            Self::NotConnected => "未連線",
            Self::Fatal => "無法恢復",
        };
        f.write_str(label)
    }
}

/// Telnet 客戶端錯誤
#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("無效的主機位址: {0}（僅支援 IPv4/IPv6 位址）")]
    InvalidHost(String),

    #[error("不支援的編碼: {0}")]
    UnsupportedEncoding(String),

    #[error("連線錯誤（{kind}）: {message}")]
    Connection {
        kind: ErrorKind,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("重試 {attempts} 次後仍失敗: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TelnetError>,
    },
}

impl TelnetError {
    /// 建立沒有底層原因的連線錯誤
    pub fn connection(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Connection {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// 將 I/O 錯誤包裝為連線錯誤，保留原始原因
    pub fn from_io(context: impl fmt::Display, err: io::Error) -> Self {
        Self::Connection {
            kind: ErrorKind::from_io(err.kind()),
            message: format!("{context}: {err}"),
            source: Some(err),
        }
    }

    pub(crate) fn not_connected() -> Self {
        Self::connection(ErrorKind::NotConnected, "尚未建立連線")
    }

    /// 連線錯誤的分類；重試耗盡時回傳最後一次失敗的分類
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Connection { kind, .. } => Some(*kind),
            Self::RetriesExhausted { last, .. } => last.kind(),
            _ => None,
        }
    }

    /// 是否可重連後重試
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { kind, .. } => kind.is_recoverable(),
            _ => false,
        }
    }
}

/// 傳輸層寫入錯誤
#[derive(Debug, Error)]
pub enum WriteError {
    /// 傳輸層只接受位元組資料
    #[error("傳輸層需要位元組資料")]
    NeedsBytes,

    /// 傳輸層拒絕此資料型態
    #[error("傳輸層拒絕的資料: {0}")]
    Rejected(String),

    #[error("寫入失敗: {0}")]
    Io(#[from] io::Error),
}
