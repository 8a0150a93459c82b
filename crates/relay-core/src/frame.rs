//! 업스트림 호가 프레임.
//!
//! 업스트림에서 수신한 메시지 하나를 원문 텍스트와 파싱된 JSON 값으로 보관합니다.
//! WebSocket 클라이언트에는 원문을 업스트림과 같은 opcode로, SSE 클라이언트에는
//! 한 줄 JSON을 전송합니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::RelayError;

/// 업스트림 메시지의 WebSocket opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// 텍스트 메시지
    #[default]
    Text,
    /// 바이너리 메시지 (UTF-8 JSON)
    Binary,
}

/// 업스트림에서 수신한 프레임.
///
/// 복제 비용이 낮도록 내부 데이터는 `Arc`로 공유됩니다.
#[derive(Debug, Clone)]
pub struct Frame {
    raw: Arc<str>,
    payload: Arc<Value>,
    format: FrameFormat,
}

impl Frame {
    /// 원문 텍스트를 JSON으로 파싱하여 프레임을 생성합니다.
    ///
    /// # Errors
    ///
    /// JSON 형식이 아니면 `RelayError::MalformedFrame`을 반환합니다.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedFrame(e.to_string()))?;

        Ok(Self {
            raw: Arc::from(text),
            payload: Arc::new(payload),
            format: FrameFormat::Text,
        })
    }

    /// 바이너리 메시지를 UTF-8 JSON으로 해석하여 프레임을 생성합니다.
    ///
    /// 원래 opcode는 [`format`](Self::format)으로 보존됩니다.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RelayError::MalformedFrame(format!("UTF-8 아님: {}", e)))?;
        let mut frame = Self::parse(text)?;
        frame.format = FrameFormat::Binary;
        Ok(frame)
    }

    /// 이미 파싱된 JSON 값으로 프레임을 생성합니다.
    pub fn from_value(payload: Value) -> Self {
        Self {
            raw: Arc::from(payload.to_string()),
            payload: Arc::new(payload),
            format: FrameFormat::Text,
        }
    }

    /// 업스트림에서 받은 opcode.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// 업스트림 원문 텍스트.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 파싱된 JSON 값.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// SSE `data:` 필드용 한 줄 JSON.
    ///
    /// 원문에 줄바꿈이 있어도 SSE 레코드가 깨지지 않도록 다시 직렬화합니다.
    pub fn to_sse_data(&self) -> String {
        self.payload.to_string()
    }

    /// SSE 레코드 전체 (`data: <json>\n\n`).
    pub fn to_sse_record(&self) -> String {
        format!("data: {}\n\n", self.to_sse_data())
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_frame() {
        let frame = Frame::parse(r#"{"bid":100,"ask":101}"#).unwrap();
        assert_eq!(frame.payload(), &json!({"bid": 100, "ask": 101}));
        assert_eq!(frame.raw(), r#"{"bid":100,"ask":101}"#);
    }

    #[test]
    fn test_parse_malformed_frame() {
        let err = Frame::parse("{not json").unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));
    }

    #[test]
    fn test_raw_is_preserved_verbatim() {
        let text = "{ \"bid\" : 100 ,\n \"ask\": 101 }";
        let frame = Frame::parse(text).unwrap();
        assert_eq!(frame.raw(), text);
    }

    #[test]
    fn test_sse_record_is_single_line() {
        let frame = Frame::parse("{\n  \"bid\": 100,\n  \"ask\": 101\n}").unwrap();
        let record = frame.to_sse_record();

        assert!(record.starts_with("data: "));
        assert!(record.ends_with("\n\n"));
        assert_eq!(record.matches('\n').count(), 2);

        let data = record.trim_start_matches("data: ").trim_end();
        let reparsed: Value = serde_json::from_str(data).unwrap();
        assert_eq!(&reparsed, frame.payload());
    }

    #[test]
    fn test_parse_bytes() {
        let frame = Frame::parse_bytes(br#"{"bid":1}"#).unwrap();
        assert_eq!(frame.payload(), &json!({"bid": 1}));
        assert_eq!(frame.raw(), r#"{"bid":1}"#);
        assert_eq!(frame.format(), FrameFormat::Binary);
        assert_eq!(Frame::parse(r#"{"bid":1}"#).unwrap().format(), FrameFormat::Text);

        assert!(Frame::parse_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_from_value() {
        let frame = Frame::from_value(json!({"bid": 102, "ask": 103}));
        assert_eq!(Frame::parse(frame.raw()).unwrap(), frame);
    }
}
