//! Device Core Library
//!
//! 智慧屏裝置自動化測試的核心功能：
//! - `telnet`: 裝置 shell 的 Telnet 連線、命令執行與重試
//! - `address`: IP 位址驗證
//! - `encoding`: 串流編解碼
//! - `config`: Session 設定
//! - `device`: 回應解析與常用裝置操作

pub mod address;
pub mod config;
pub mod device;
pub mod encoding;
pub mod telnet;

pub use address::is_valid_ip;
pub use config::{ConfigError, SessionConfig};
pub use device::{output_lines, value_after_equals, Device, OutputTracker};
pub use telnet::{
    ConnectionState, ErrorKind, SharedSession, Session, TcpConnector, TelnetError, TransportMode,
};
