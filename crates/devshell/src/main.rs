//! 裝置 shell 命令列工具
//!
//! 透過 Telnet 在智慧屏裝置上執行命令，例如：
//!
//! ```text
//! devshell 192.168.1.30 "cat /customer/version.ini" "ls /mnt/"
//! echo "df -h" | devshell 192.168.1.30 --raw
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use devcore::{output_lines, OutputTracker, Session, SessionConfig, TelnetError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 在智慧屏裝置上執行 shell 命令
#[derive(FromArgs)]
struct Args {
    /// 裝置 IP 位址
    #[argh(positional)]
    host: String,

    /// 要執行的命令；未指定時從標準輸入逐行讀取
    #[argh(positional)]
    commands: Vec<String>,

    /// JSON 設定檔路徑
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// telnet 連接埠（預設 23）
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// 回應的閒置逾時秒數
    #[argh(option)]
    read_timeout: Option<f64>,

    /// 輸出原始回應（含回顯與提示字元）
    #[argh(switch)]
    raw: bool,

    /// 只輸出與上一次回應相比新增的內容
    #[argh(switch)]
    new_only: bool,
}

struct Output {
    raw: bool,
    tracker: Option<OutputTracker>,
}

impl Output {
    fn print(&mut self, command: &str, response: &str) {
        let response = match self.tracker.as_mut() {
            Some(tracker) => tracker.fresh(response),
            None => response.to_string(),
        };

        if self.raw {
            print!("{response}");
        } else {
            for line in output_lines(&response, command) {
                println!("{line}");
            }
        }
    }
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("無法載入設定檔 {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.read_timeout {
        config.read_timeout =
            Duration::try_from_secs_f64(secs).context("閒置逾時必須是非負數")?;
    }
    Ok(config)
}

async fn run_commands(
    session: &mut Session,
    commands: Vec<String>,
    mut output: Output,
) -> Result<(), TelnetError> {
    if !commands.is_empty() {
        for command in &commands {
            let response = session.send_command(command, None).await?;
            output.print(command, &response);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("標準輸入讀取結束: {}", e);
                break;
            }
        };

        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let response = session.send_command(command, None).await?;
        output.print(command, &response);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日誌
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    let config = load_config(&args)?;
    if config.max_attempts == 0 {
        bail!("max_attempts 至少為 1");
    }

    let mut session = Session::new(&args.host, config)?;
    let output = Output {
        raw: args.raw,
        tracker: args.new_only.then(OutputTracker::new),
    };
    let commands = args.commands;

    session
        .scoped(|s| Box::pin(run_commands(s, commands, output)))
        .await
        .with_context(|| format!("在 {} 上執行命令失敗", args.host))?;

    Ok(())
}
