//! Web message bridge wire format
//!
//! The hosted page talks to the engine over a one-directional JSON channel
//! (`window.chrome.webview.postMessage`). Parsing degrades gracefully: a
//! missing field means "that field is absent", never a hard failure, and an
//! unrecognized type is logged verbatim rather than treated as an error.
//! Only a payload that is not JSON at all counts as malformed.

use crate::ad_regions::AdRegion;
use log::{debug, warn};
use serde_json::Value;

/// Decoded inbound message from the hosted content.
#[derive(Debug, PartialEq)]
pub enum BridgeMessage {
    /// Full replacement of the ad-region set.
    IframeData(Vec<AdRegion>),
    /// Open an address through the OS, bypassing the rendering sandbox.
    OpenUrl { url: Option<String> },
    /// Wallpaper announced itself; diagnostic only.
    Ready { name: Option<String> },
    /// Diagnostic passthrough from page script.
    Log { message: Option<String> },
    /// Recognizably JSON, but not a known type.
    Unknown { raw: String },
    /// Not parseable as JSON. Never fatal.
    Malformed,
}

/// Parse one raw message from the bridge channel.
pub fn parse_message(raw: &str) -> BridgeMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Malformed bridge message ({}): {}", e, truncated(raw));
            return BridgeMessage::Malformed;
        }
    };

    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "IFRAME_DATA" => BridgeMessage::IframeData(extract_regions(&value)),
        "OPEN_URL" | "openURL" => BridgeMessage::OpenUrl {
            url: string_field(&value, "url"),
        },
        "READY" | "ready" => BridgeMessage::Ready {
            name: string_field(&value, "name"),
        },
        "LOG" => BridgeMessage::Log {
            message: string_field(&value, "message"),
        },
        _ => BridgeMessage::Unknown {
            raw: truncated(raw),
        },
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Pull the region list out of an `IFRAME_DATA` payload. Elements that fail
/// to deserialize are skipped individually; partial data is acceptable.
fn extract_regions(value: &Value) -> Vec<AdRegion> {
    let Some(items) = value.get("iframes").and_then(Value::as_array) else {
        debug!("IFRAME_DATA without 'iframes' array, treating as empty");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(region) => Some(region),
            Err(e) => {
                warn!("Skipping unreadable iframe entry: {}", e);
                None
            }
        })
        .collect()
}

fn truncated(raw: &str) -> String {
    const MAX: usize = 256;
    if raw.len() <= MAX {
        raw.to_string()
    } else {
        let mut end = MAX;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &raw[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iframe_data_full_parse() {
        let raw = r#"{"type":"IFRAME_DATA","iframes":[
            {"id":"ad1","src":"https://ads.example/f","clickUrl":"http://ad/1",
             "left":10,"top":20,"width":300,"height":250,"visible":true},
            {"id":"ad2","clickUrl":"","left":0,"top":0,"width":1,"height":1,"visible":false}
        ]}"#;
        match parse_message(raw) {
            BridgeMessage::IframeData(regions) => {
                assert_eq!(regions.len(), 2);
                assert_eq!(regions[0].id, "ad1");
                assert_eq!(regions[0].click_url, "http://ad/1");
                assert!(!regions[1].visible);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_iframe_data_missing_array_degrades_to_empty() {
        match parse_message(r#"{"type":"IFRAME_DATA"}"#) {
            BridgeMessage::IframeData(regions) => assert!(regions.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_open_url_both_spellings() {
        let a = parse_message(r#"{"type":"OPEN_URL","url":"https://example.com"}"#);
        let b = parse_message(r#"{"type":"openURL","url":"https://example.com"}"#);
        let expected = BridgeMessage::OpenUrl {
            url: Some("https://example.com".to_string()),
        };
        assert_eq!(a, expected);
        assert_eq!(b, expected);
    }

    #[test]
    fn test_open_url_missing_field_is_absent_not_fatal() {
        assert_eq!(
            parse_message(r#"{"type":"OPEN_URL"}"#),
            BridgeMessage::OpenUrl { url: None }
        );
    }

    #[test]
    fn test_ready_variants() {
        assert_eq!(
            parse_message(r#"{"type":"ready","name":"aquarium"}"#),
            BridgeMessage::Ready {
                name: Some("aquarium".to_string())
            }
        );
        assert_eq!(
            parse_message(r#"{"type":"READY"}"#),
            BridgeMessage::Ready { name: None }
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        match parse_message(r#"{"type":"TELEMETRY","x":1}"#) {
            BridgeMessage::Unknown { raw } => assert!(raw.contains("TELEMETRY")),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_braces_are_malformed() {
        assert_eq!(parse_message(r#"{"type":"READY""#), BridgeMessage::Malformed);
        assert_eq!(parse_message("not json"), BridgeMessage::Malformed);
    }
}
