//! 測試用的腳本化連線

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use super::error::WriteError;
use super::transport::{Chunk, Connector, Payload, ShutdownStyle, TelnetStream, Transport, TransportMode};

#[derive(Debug, Default)]
struct ProbeState {
    connects: usize,
    closes: usize,
    text: Vec<String>,
    bytes: Vec<Vec<u8>>,
}

/// 記錄連線次數與寫入內容，供測試檢查
#[derive(Debug, Clone, Default)]
pub struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    pub fn written_text(&self) -> Vec<String> {
        self.0.lock().unwrap().text.clone()
    }

    pub fn written_bytes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().bytes.clone()
    }
}

/// 讀取腳本的一步
#[derive(Debug)]
pub enum Step {
    Data(Chunk),
    /// 不再有資料（讀取會一直等待）
    Idle,
    /// 連線被重置
    Abort,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Data(Chunk::Text(text.to_string()))
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Self::Data(Chunk::Bytes(bytes.to_vec()))
    }
}

pub struct ScriptedTransport {
    mode: TransportMode,
    steps: VecDeque<Step>,
    reject_text: bool,
    reject_bytes: bool,
    reject_all: bool,
    write_error: Option<io::ErrorKind>,
    style: ShutdownStyle,
    closing: bool,
    probe: Probe,
}

impl ScriptedTransport {
    fn new(mode: TransportMode, probe: &Probe) -> Self {
        Self {
            mode,
            steps: VecDeque::new(),
            reject_text: false,
            reject_bytes: false,
            reject_all: false,
            write_error: None,
            style: ShutdownStyle::WaitClosed,
            closing: false,
            probe: probe.clone(),
        }
    }

    pub fn text(probe: &Probe) -> Self {
        Self::new(TransportMode::Text, probe)
    }

    pub fn bytes(probe: &Probe) -> Self {
        Self::new(TransportMode::Bytes, probe)
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    /// 文字寫入回傳 `NeedsBytes`
    pub fn reject_text(mut self) -> Self {
        self.reject_text = true;
        self
    }

    /// 任何寫入都回傳 `NeedsBytes`
    pub fn reject_bytes(mut self) -> Self {
        self.reject_bytes = true;
        self
    }

    /// 任何寫入都回傳 `Rejected`
    pub fn reject_all(mut self) -> Self {
        self.reject_all = true;
        self
    }

    /// 第一次寫入回傳 I/O 錯誤
    pub fn fail_write(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    pub fn grace_delay(mut self) -> Self {
        self.style = ShutdownStyle::GraceDelay;
        self
    }
}

impl Transport for ScriptedTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn read_chunk(&mut self, _max: usize) -> io::Result<Chunk> {
        match self.steps.pop_front() {
            Some(Step::Data(chunk)) => {
                if chunk.is_empty() {
                    self.closing = true;
                }
                Ok(chunk)
            }
            Some(Step::Abort) => {
                self.closing = true;
                Err(io::Error::from(io::ErrorKind::ConnectionReset))
            }
            Some(Step::Idle) | None => std::future::pending().await,
        }
    }

    fn write(&mut self, payload: Payload<'_>) -> Result<(), WriteError> {
        if let Some(kind) = self.write_error.take() {
            self.closing = true;
            return Err(WriteError::Io(io::Error::from(kind)));
        }
        if self.reject_all {
            return Err(WriteError::Rejected("測試拒絕".to_string()));
        }
        if self.reject_bytes {
            return Err(WriteError::NeedsBytes);
        }

        let mut state = self.probe.0.lock().unwrap();
        match payload {
            Payload::Text(_) if self.reject_text => return Err(WriteError::NeedsBytes),
            Payload::Text(text) => state.text.push(text.to_string()),
            Payload::Bytes(bytes) => state.bytes.push(bytes.to_vec()),
        }
        Ok(())
    }

    async fn drain(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_closing(&self) -> bool {
        self.closing
    }

    fn close(&mut self) {
        self.closing = true;
        self.probe.0.lock().unwrap().closes += 1;
    }

    fn shutdown_style(&self) -> ShutdownStyle {
        self.style
    }
}

enum Outcome {
    Ready(ScriptedTransport),
    Fail(io::ErrorKind),
    Hang,
}

/// 依序回傳預先準備的連線；用完後拒絕連線
pub struct ScriptedConnector {
    outcomes: VecDeque<Outcome>,
    probe: Probe,
}

impl ScriptedConnector {
    pub fn new(probe: &Probe) -> Self {
        Self {
            outcomes: VecDeque::new(),
            probe: probe.clone(),
        }
    }

    pub fn transport(mut self, transport: ScriptedTransport) -> Self {
        self.outcomes.push_back(Outcome::Ready(transport));
        self
    }

    pub fn refuse(mut self, kind: io::ErrorKind) -> Self {
        self.outcomes.push_back(Outcome::Fail(kind));
        self
    }

    pub fn hang(mut self) -> Self {
        self.outcomes.push_back(Outcome::Hang);
        self
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    async fn connect(&mut self, _host: &str, _port: u16) -> io::Result<ScriptedTransport> {
        self.probe.0.lock().unwrap().connects += 1;
        match self.outcomes.pop_front() {
            Some(Outcome::Ready(transport)) => Ok(transport),
            Some(Outcome::Fail(kind)) => Err(io::Error::from(kind)),
            Some(Outcome::Hang) => std::future::pending().await,
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

/// 以 tokio-test 的模擬串流建立真正的 [`TelnetStream`]
pub struct StreamConnector {
    streams: VecDeque<tokio_test::io::Mock>,
}

impl StreamConnector {
    pub fn new(streams: Vec<tokio_test::io::Mock>) -> Self {
        Self {
            streams: streams.into(),
        }
    }
}

impl Connector for StreamConnector {
    type Transport = TelnetStream<tokio_test::io::Mock>;

    async fn connect(&mut self, _host: &str, _port: u16) -> io::Result<Self::Transport> {
        let stream = self
            .streams
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(TelnetStream::new(stream, Some(encoding_rs::UTF_8)))
    }
}
