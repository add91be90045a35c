//! 文字編解碼模組
//!
//! 裝置 shell 輸出多為 UTF-8，部分舊韌體使用 GBK。
//! Telnet 沒有訊息邊界，多位元組字元可能被切在兩次讀取之間，
//! 因此解碼一律走串流解碼器。

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

/// 依標籤（如 `"utf-8"`、`"gbk"`）查找編碼
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// 將文字編碼為指定編碼的位元組（無法編碼的字元會被替換）
///
/// # Example
/// ```
/// use devcore::encoding::{encode_text, resolve_encoding};
///
/// let gbk = resolve_encoding("gbk").unwrap();
/// assert_eq!(encode_text(gbk, "你好"), vec![0xc4, 0xe3, 0xba, 0xc3]);
/// ```
pub fn encode_text(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    let (encoded, _, _) = encoding.encode(text);
    encoded.into_owned()
}

/// 串流解碼器
///
/// 保留跨區塊的不完整位元組序列；無效序列以 U+FFFD 取代，不會失敗。
pub struct StreamDecoder {
    decoder: Decoder,
}

impl StreamDecoder {
    /// 創建指定編碼的解碼器
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
        }
    }

    /// UTF-8 解碼器
    pub fn utf8() -> Self {
        Self::new(UTF_8)
    }

    /// 解碼一個區塊並附加到 `out`
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.decode_inner(bytes, out, false);
    }

    /// 結束串流，輸出殘留的不完整序列（以替換字元表示）
    pub fn finish(&mut self, out: &mut String) {
        self.decode_inner(&[], out, true);
    }

    fn decode_inner(&mut self, mut bytes: &[u8], out: &mut String, last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 3 + 4);
            out.reserve(needed);

            let (result, read, _) = self.decoder.decode_to_string(bytes, out, last);
            bytes = &bytes[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::utf8()
    }
}
