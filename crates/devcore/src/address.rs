//! 主機位址驗證
//!
//! 裝置連線只接受 IP 字面值，不做 DNS 解析

use std::net::Ipv6Addr;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// 嚴格的點分十進位 IPv4（每段 0-255，不允許前導零）
    static ref IPV4_RE: Regex = Regex::new(
        r"^((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])$"
    )
    .expect("IPv4 正規表示式無效");
}

/// 檢查字串是否為合法的 IPv4 或 IPv6 位址
///
/// - 含 `:` 的字串依 IPv6 字面值文法判斷（完整、`::` 壓縮、結尾內嵌 IPv4）
/// - 其餘含 `.` 的字串依嚴格 IPv4 判斷
/// - 主機名稱一律視為無效
///
/// # Example
/// ```
/// use devcore::address::is_valid_ip;
///
/// assert!(is_valid_ip("192.168.1.1"));
/// assert!(is_valid_ip("fe80::1"));
/// assert!(!is_valid_ip("256.1.1.1"));
/// assert!(!is_valid_ip("screen.local"));
/// ```
pub fn is_valid_ip(host: &str) -> bool {
    if host.contains(':') {
        host.parse::<Ipv6Addr>().is_ok()
    } else if host.contains('.') {
        IPV4_RE.is_match(host)
    } else {
        false
    }
}
