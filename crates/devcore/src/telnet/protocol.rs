//! Telnet 協定常數和解析
//!
//! 實作 RFC 854 的命令序列處理，足以應付 busybox telnetd 的選項協商

use std::borrow::Cow;

/// Telnet IAC (Interpret As Command) - 0xFF
pub const IAC: u8 = 255;

/// 等待 IAC SE 時最多保留的 sub-negotiation 內容長度
///
/// 超過後放棄這段 sub-negotiation，其後的位元組當作一般資料。
pub const MAX_SUBNEGOTIATION_LEN: usize = 4096;

/// Telnet 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Sub-negotiation End
    Se = 240,
    /// No Operation
    Nop = 241,
    /// Data Mark
    DataMark = 242,
    /// Break
    Break = 243,
    /// Interrupt Process
    InterruptProcess = 244,
    /// Abort Output
    AbortOutput = 245,
    /// Are You There
    AreYouThere = 246,
    /// Erase Character
    EraseCharacter = 247,
    /// Erase Line
    EraseLine = 248,
    /// Go Ahead
    GoAhead = 249,
    /// Sub-negotiation Begin
    Sb = 250,
    /// Will
    Will = 251,
    /// Won't
    Wont = 252,
    /// Do
    Do = 253,
    /// Don't
    Dont = 254,
}

impl TelnetCommand {
    /// 從位元組解析 Telnet 命令
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            240 => Some(Self::Se),
            241 => Some(Self::Nop),
            242 => Some(Self::DataMark),
            243 => Some(Self::Break),
            244 => Some(Self::InterruptProcess),
            245 => Some(Self::AbortOutput),
            246 => Some(Self::AreYouThere),
            247 => Some(Self::EraseCharacter),
            248 => Some(Self::EraseLine),
            249 => Some(Self::GoAhead),
            250 => Some(Self::Sb),
            251 => Some(Self::Will),
            252 => Some(Self::Wont),
            253 => Some(Self::Do),
            254 => Some(Self::Dont),
            _ => None,
        }
    }

    fn is_negotiation(self) -> bool {
        matches!(self, Self::Will | Self::Wont | Self::Do | Self::Dont)
    }
}

/// Telnet 選項
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetOption {
    /// Binary Transmission
    BinaryTransmission,
    /// Echo
    Echo,
    /// Suppress Go Ahead
    SuppressGoAhead,
    /// Status
    Status,
    /// Terminal Type
    TerminalType,
    /// Window Size (NAWS)
    Naws,
    /// Terminal Speed
    TerminalSpeed,
    /// Remote Flow Control
    RemoteFlowControl,
    /// Linemode
    Linemode,
    /// Environment Variables (New)
    NewEnviron,
    /// Charset
    Charset,
    /// Unknown option
    Unknown(u8),
}

impl TelnetOption {
    /// 從位元組解析 Telnet 選項
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::BinaryTransmission,
            1 => Self::Echo,
            3 => Self::SuppressGoAhead,
            5 => Self::Status,
            24 => Self::TerminalType,
            31 => Self::Naws,
            32 => Self::TerminalSpeed,
            33 => Self::RemoteFlowControl,
            34 => Self::Linemode,
            39 => Self::NewEnviron,
            42 => Self::Charset,
            other => Self::Unknown(other),
        }
    }

    /// 獲取選項的位元組值
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::BinaryTransmission => 0,
            Self::Echo => 1,
            Self::SuppressGoAhead => 3,
            Self::Status => 5,
            Self::TerminalType => 24,
            Self::Naws => 31,
            Self::TerminalSpeed => 32,
            Self::RemoteFlowControl => 33,
            Self::Linemode => 34,
            Self::NewEnviron => 39,
            Self::Charset => 42,
            Self::Unknown(b) => *b,
        }
    }
}

/// Telnet 資料流中的非資料事件
#[derive(Debug, Clone, PartialEq)]
pub enum TelnetEvent {
    /// 選項協商（WILL, WONT, DO, DONT）
    Negotiation(TelnetCommand, TelnetOption),
    /// Sub-negotiation 資料
    Subnegotiation(TelnetOption, Vec<u8>),
    /// 其他雙位元組命令（NOP, GA ...）
    Command(TelnetCommand),
}

/// 一次解析的結果
#[derive(Debug, Default, PartialEq)]
pub struct ParsedData {
    /// 去除命令序列後的資料位元組
    pub data: Vec<u8>,
    /// 解析出的事件
    pub events: Vec<TelnetEvent>,
    /// 已消耗的輸入位元組數；其餘為不完整的命令序列，需等待下一次讀取
    pub consumed: usize,
}

/// 解析 Telnet 資料流，分離出資料和命令
pub fn parse_telnet_data(input: &[u8]) -> ParsedData {
    let mut parsed = ParsedData::default();
    let mut i = 0;

    while i < input.len() {
        if input[i] != IAC {
            parsed.data.push(input[i]);
            i += 1;
            continue;
        }

        let Some(&second) = input.get(i + 1) else {
            break;
        };

        if second == IAC {
            // IAC IAC = 轉義的 0xFF
            parsed.data.push(IAC);
            i += 2;
            continue;
        }

        match TelnetCommand::from_byte(second) {
            Some(cmd) if cmd.is_negotiation() => {
                let Some(&option) = input.get(i + 2) else {
                    break;
                };
                parsed
                    .events
                    .push(TelnetEvent::Negotiation(cmd, TelnetOption::from_byte(option)));
                i += 3;
            }
            Some(TelnetCommand::Sb) => {
                let Some(&option) = input.get(i + 2) else {
                    break;
                };
                // 尋找 Sub-negotiation 結束 (IAC SE)
                let body_start = i + 3;
                let end = input[body_start..]
                    .windows(2)
                    .position(|w| w[0] == IAC && w[1] == TelnetCommand::Se as u8);
                let Some(offset) = end else {
                    if input.len() - body_start > MAX_SUBNEGOTIATION_LEN {
                        i = body_start;
                        continue;
                    }
                    break;
                };
                let body = input[body_start..body_start + offset].to_vec();
                parsed
                    .events
                    .push(TelnetEvent::Subnegotiation(TelnetOption::from_byte(option), body));
                i = body_start + offset + 2;
            }
            Some(cmd) => {
                parsed.events.push(TelnetEvent::Command(cmd));
                i += 2;
            }
            None => {
                // 未定義的命令位元組，直接略過
                i += 2;
            }
        }
    }

    parsed.consumed = i;
    parsed
}

/// 生成協商回應
///
/// 接受 ECHO 和 SGA（伺服器端回顯、不使用 Go-Ahead），其餘一律拒絕。
/// WONT/DONT 不需要回應。
pub fn negotiation_reply(cmd: TelnetCommand, option: TelnetOption) -> Vec<u8> {
    let accepted = matches!(option, TelnetOption::Echo | TelnetOption::SuppressGoAhead);

    let response = match cmd {
        TelnetCommand::Will if accepted => TelnetCommand::Do,
        TelnetCommand::Will => TelnetCommand::Dont,
        TelnetCommand::Do if option == TelnetOption::SuppressGoAhead => TelnetCommand::Will,
        TelnetCommand::Do => TelnetCommand::Wont,
        _ => return vec![],
    };

    vec![IAC, response as u8, option.as_byte()]
}

/// 將資料中的 0xFF 轉義為 IAC IAC
pub fn escape_iac(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.contains(&IAC) {
        return Cow::Borrowed(data);
    }

    let mut escaped = Vec::with_capacity(data.len() + 4);
    for &b in data {
        escaped.push(b);
        if b == IAC {
            escaped.push(IAC);
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        let parsed = parse_telnet_data(b"/ # ");
        assert_eq!(parsed.data, b"/ # ");
        assert!(parsed.events.is_empty());
        assert_eq!(parsed.consumed, 4);
    }

    #[test]
    fn test_parse_escaped_iac() {
        let input = [b'A', IAC, IAC, b'B'];
        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.data, vec![b'A', IAC, b'B']);
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn test_parse_will_echo() {
        let input = [IAC, TelnetCommand::Will as u8, TelnetOption::Echo.as_byte()];
        let parsed = parse_telnet_data(&input);
        assert!(parsed.data.is_empty());
        assert_eq!(
            parsed.events,
            vec![TelnetEvent::Negotiation(TelnetCommand::Will, TelnetOption::Echo)]
        );
        assert_eq!(parsed.consumed, 3);
    }

    #[test]
    fn test_parse_mixed_content() {
        let mut input = b"login".to_vec();
        input.extend_from_slice(&[IAC, TelnetCommand::Do as u8, TelnetOption::Naws.as_byte()]);
        input.extend_from_slice(b": ");

        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.data, b"login: ");
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.consumed, input.len());
    }

    #[test]
    fn test_incomplete_sequence_not_consumed() {
        let input = [b'x', IAC, TelnetCommand::Do as u8];
        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.data, b"x");
        assert!(parsed.events.is_empty());
        assert_eq!(parsed.consumed, 1);
    }

    #[test]
    fn test_subnegotiation() {
        let input = [
            IAC,
            TelnetCommand::Sb as u8,
            TelnetOption::TerminalType.as_byte(),
            1,
            IAC,
            TelnetCommand::Se as u8,
            b'#',
        ];
        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.data, b"#");
        assert_eq!(
            parsed.events,
            vec![TelnetEvent::Subnegotiation(TelnetOption::TerminalType, vec![1])]
        );
    }

    #[test]
    fn test_unterminated_subnegotiation_waits() {
        let input = [IAC, TelnetCommand::Sb as u8, 24, 1, 2];
        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.consumed, 0);
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn test_oversized_subnegotiation_is_dropped() {
        let mut input = vec![IAC, TelnetCommand::Sb as u8, 24];
        input.extend(std::iter::repeat(b'a').take(MAX_SUBNEGOTIATION_LEN + 1));
        input.extend_from_slice(b"\r\n/ # ");

        let parsed = parse_telnet_data(&input);
        assert_eq!(parsed.consumed, input.len());
        assert!(parsed.events.is_empty());
        assert_eq!(parsed.data.len(), MAX_SUBNEGOTIATION_LEN + 1 + 6);
        assert!(parsed.data.ends_with(b"/ # "));
    }

    #[test]
    fn test_refuse_unknown_option() {
        let reply = negotiation_reply(TelnetCommand::Do, TelnetOption::TerminalType);
        assert_eq!(
            reply,
            vec![IAC, TelnetCommand::Wont as u8, TelnetOption::TerminalType.as_byte()]
        );
    }

    #[test]
    fn test_accept_echo() {
        let reply = negotiation_reply(TelnetCommand::Will, TelnetOption::Echo);
        assert_eq!(reply, vec![IAC, TelnetCommand::Do as u8, TelnetOption::Echo.as_byte()]);
    }

    #[test]
    fn test_no_reply_to_wont() {
        assert!(negotiation_reply(TelnetCommand::Wont, TelnetOption::Echo).is_empty());
        assert!(negotiation_reply(TelnetCommand::Dont, TelnetOption::Naws).is_empty());
    }

    #[test]
    fn test_escape_iac() {
        assert!(matches!(escape_iac(b"ls"), Cow::Borrowed(_)));
        assert_eq!(escape_iac(&[1, IAC, 2]).as_ref(), &[1, IAC, IAC, 2]);
    }

    #[test]
    fn test_telnet_option_roundtrip() {
        for byte in 0..=255u8 {
            assert_eq!(TelnetOption::from_byte(byte).as_byte(), byte);
        }
    }
}
