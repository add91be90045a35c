//! 傳輸層抽象
//!
//! Session 只透過 [`Transport`] 讀寫，透過 [`Connector`] 建立連線，
//! 方便在測試中替換成腳本化的假連線。

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};

use bytes::BytesMut;
use encoding_rs::Encoding;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::error::WriteError;
use super::protocol::{escape_iac, negotiation_reply, parse_telnet_data, TelnetEvent};
use crate::encoding::{encode_text, StreamDecoder};

/// 協商後的傳輸模式，連線時決定一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// 傳輸層負責編解碼，收發文字
    Text,
    /// 收發原始位元組
    Bytes,
}

/// 一次讀取得到的區塊；空區塊代表遠端已關閉
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Bytes(Vec<u8>),
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

/// 寫入的資料
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// 關閉寫入端後如何等待完成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStyle {
    /// 呼叫 [`Transport::wait_closed`] 等待完成
    WaitClosed,
    /// 沒有完成信號，只能等待一小段固定時間
    GraceDelay,
}

/// 一條已建立的傳輸連線（讀取端與寫入端合一）
pub trait Transport: Send {
    /// 傳輸模式；無法判斷時視為位元組模式
    fn mode(&self) -> TransportMode {
        TransportMode::Bytes
    }

    /// 讀取最多 `max` 單位的資料；回傳空區塊表示遠端已關閉
    fn read_chunk(&mut self, max: usize) -> impl Future<Output = io::Result<Chunk>> + Send;

    /// 寫入緩衝區，需呼叫 [`Transport::drain`] 才會送出
    fn write(&mut self, payload: Payload<'_>) -> Result<(), WriteError>;

    /// 送出寫入緩衝區
    fn drain(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// 寫入端是否正在關閉或已關閉
    fn is_closing(&self) -> bool;

    /// 開始關閉寫入端
    fn close(&mut self);

    fn shutdown_style(&self) -> ShutdownStyle {
        ShutdownStyle::GraceDelay
    }

    /// 等待關閉完成（僅在 [`ShutdownStyle::WaitClosed`] 時呼叫）
    fn wait_closed(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        async { Ok(()) }
    }
}

/// 建立傳輸連線
pub trait Connector: Send {
    type Transport: Transport;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Transport>> + Send;
}

/// 在任意位元組串流上實作 Telnet 傳輸
///
/// 過濾 IAC 命令序列並回應選項協商。設定編碼時為文字模式，
/// 否則為位元組模式（拒絕文字寫入）。
pub struct TelnetStream<S> {
    stream: S,
    encoding: Option<&'static Encoding>,
    decoder: Option<StreamDecoder>,
    /// 尚未處理完的原始位元組（不完整的命令序列）
    pending: Vec<u8>,
    /// 已去除命令序列、尚未交給呼叫端的資料
    ready: Vec<u8>,
    outgoing: BytesMut,
    closing: bool,
}

impl<S> TelnetStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, encoding: Option<&'static Encoding>) -> Self {
        Self {
            stream,
            encoding,
            decoder: encoding.map(StreamDecoder::new),
            pending: Vec::new(),
            ready: Vec::new(),
            outgoing: BytesMut::new(),
            closing: false,
        }
    }

    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    fn closed_chunk(&self) -> Chunk {
        match self.decoder {
            Some(_) => Chunk::Text(String::new()),
            None => Chunk::Bytes(Vec::new()),
        }
    }

    /// 取出已就緒的資料；只有半個字元時回傳 `None`
    fn take_ready(&mut self) -> Option<Chunk> {
        if self.ready.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.ready);
        match self.decoder.as_mut() {
            Some(decoder) => {
                let mut text = String::new();
                decoder.decode(&data, &mut text);
                (!text.is_empty()).then_some(Chunk::Text(text))
            }
            None => Some(Chunk::Bytes(data)),
        }
    }

    async fn answer(&mut self, events: Vec<TelnetEvent>) -> io::Result<()> {
        let mut replies = Vec::new();
        for event in events {
            match event {
                TelnetEvent::Negotiation(cmd, option) => {
                    trace!(?cmd, ?option, "收到選項協商");
                    replies.extend(negotiation_reply(cmd, option));
                }
                other => trace!(?other, "略過 Telnet 事件"),
            }
        }

        if !replies.is_empty() {
            self.stream.write_all(&replies).await?;
            self.stream.flush().await?;
        }
        Ok(())
    }
}

impl<S> Transport for TelnetStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn mode(&self) -> TransportMode {
        match self.encoding {
            Some(_) => TransportMode::Text,
            None => TransportMode::Bytes,
        }
    }

    async fn read_chunk(&mut self, max: usize) -> io::Result<Chunk> {
        let mut buffer = vec![0u8; max.max(1)];

        loop {
            if let Some(chunk) = self.take_ready() {
                return Ok(chunk);
            }

            let n = self.stream.read(&mut buffer).await?;
            if n == 0 {
                self.closing = true;
                return Ok(self.closed_chunk());
            }

            self.pending.extend_from_slice(&buffer[..n]);
            let parsed = parse_telnet_data(&self.pending);
            self.pending.drain(..parsed.consumed);
            // 先保存資料再回應協商，回應途中被取消也不會遺失
            self.ready.extend_from_slice(&parsed.data);
            self.answer(parsed.events).await?;
        }
    }

    fn write(&mut self, payload: Payload<'_>) -> Result<(), WriteError> {
        if self.closing {
            return Err(WriteError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "寫入端已關閉",
            )));
        }

        match payload {
            Payload::Text(text) => {
                let encoding = self.encoding.ok_or(WriteError::NeedsBytes)?;
                let bytes = encode_text(encoding, text);
                self.outgoing.extend_from_slice(&escape_iac(&bytes));
            }
            Payload::Bytes(bytes) => self.outgoing.extend_from_slice(&escape_iac(bytes)),
        }
        Ok(())
    }

    async fn drain(&mut self) -> io::Result<()> {
        let data = self.outgoing.split().freeze();
        let result = async {
            if !data.is_empty() {
                self.stream.write_all(&data).await?;
            }
            self.stream.flush().await
        }
        .await;

        if result.is_err() {
            self.closing = true;
        }
        result
    }

    fn is_closing(&self) -> bool {
        self.closing
    }

    fn close(&mut self) {
        self.closing = true;
    }

    fn shutdown_style(&self) -> ShutdownStyle {
        ShutdownStyle::WaitClosed
    }

    async fn wait_closed(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// 以 TCP 連線到裝置的 Telnet 服務
#[derive(Debug, Clone)]
pub struct TcpConnector {
    encoding: Option<&'static Encoding>,
}

impl TcpConnector {
    /// `encoding` 為 `None` 時連線為位元組模式
    pub fn new(encoding: Option<&'static Encoding>) -> Self {
        Self { encoding }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Some(encoding_rs::UTF_8))
    }
}

impl Connector for TcpConnector {
    type Transport = TelnetStream<TcpStream>;

    async fn connect(&mut self, host: &str, port: u16) -> io::Result<Self::Transport> {
        let ip: IpAddr = host.parse().map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("不是 IP 位址: {host}"))
        })?;

        let stream = TcpStream::connect(SocketAddr::new(ip, port)).await?;
        stream.set_nodelay(true)?;
        debug!("TCP 已連線到 {}:{}", host, port);

        Ok(TelnetStream::new(stream, self.encoding))
    }
}
