//! Telnet 協定模組
//!
//! 實作裝置 shell 的 Telnet 連線管理、命令執行與重試

mod error;
mod protocol;
mod session;
mod shared;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, TelnetError, WriteError};
pub use protocol::{TelnetCommand, TelnetOption};
pub use session::{ConnectionState, ScopedFuture, Session, LINE_ENDING};
pub use shared::SharedSession;
pub use transport::{
    Chunk, Connector, Payload, ShutdownStyle, TcpConnector, TelnetStream, Transport, TransportMode,
};
