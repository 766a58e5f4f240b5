//! JSON event payload helpers
//!
//! Event content is a JSON object of string-keyed fields. Payloads longer
//! than [`MAX_JSON_LEN`] bytes are rejected, never truncated.

use serde_json::{json, Map, Value};

use crate::error::{DAudioError, Result};

/// Maximum encoded length of an event payload
pub const MAX_JSON_LEN: usize = 1024;

pub const KEY_DH_ID: &str = "dhId";
pub const KEY_DEV_ID: &str = "devId";
pub const KEY_RESULT: &str = "result";
pub const KEY_ATTRS: &str = "attrs";
pub const KEY_AUDIO_PARAM: &str = "audioParam";
pub const KEY_VOLUME_LEVEL: &str = "volumeLevel";
pub const KEY_MUTE_STATUS: &str = "muteStatus";
pub const KEY_EVENT_PARAM: &str = "eventParam";

/// Parse a bounded, non-empty JSON object
pub fn parse_json_object(content: &str) -> Result<Map<String, Value>> {
    if content.is_empty() {
        return Err(DAudioError::param_invalid("empty event content"));
    }
    if content.len() > MAX_JSON_LEN {
        return Err(DAudioError::param_invalid(format!(
            "event content of {} bytes exceeds {}",
            content.len(),
            MAX_JSON_LEN
        )));
    }
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DAudioError::param_invalid("event content is not a JSON object")),
        Err(e) => Err(DAudioError::param_invalid(format!("malformed event content: {}", e))),
    }
}

/// Read the device handle from a parsed payload.
///
/// Accepts both `"dhId": "1"` and `"dhId": 1`.
pub fn get_dh_id(map: &Map<String, Value>) -> Result<i32> {
    match map.get(KEY_DH_ID) {
        None => Err(DAudioError::not_found_key(KEY_DH_ID)),
        Some(Value::String(s)) => crate::dh_id::parse_dh_id(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| DAudioError::param_invalid(format!("dhId {} out of range", n))),
        Some(other) => Err(DAudioError::param_invalid(format!(
            "dhId has unexpected type: {}",
            other
        ))),
    }
}

/// Read an integer field
pub fn get_i32(map: &Map<String, Value>, key: &str) -> Result<i32> {
    let value = map.get(key).ok_or_else(|| DAudioError::not_found_key(key))?;
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| DAudioError::param_invalid(format!("{} is not an integer", key)))
}

/// Extract the device handle from an event body, `None` when absent or invalid
pub fn parse_dh_id_from_event(content: &str) -> Option<i32> {
    let map = parse_json_object(content).ok()?;
    get_dh_id(&map).ok()
}

/// Payload naming only a device handle
pub fn dh_id_content(dh_id: i32) -> String {
    json!({ KEY_DH_ID: dh_id.to_string() }).to_string()
}

/// Payload naming a device handle and a result code
pub fn result_content(dh_id: i32, result: i32) -> String {
    json!({ KEY_DH_ID: dh_id.to_string(), KEY_RESULT: result }).to_string()
}

/// Attach `dhId` to an HDF event body.
///
/// JSON objects gain the key; anything else is wrapped under `eventParam`.
pub fn with_dh_id(dh_id: i32, content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(mut map)) => {
            map.insert(KEY_DH_ID.to_string(), Value::String(dh_id.to_string()));
            Value::Object(map).to_string()
        }
        _ => json!({ KEY_DH_ID: dh_id.to_string(), KEY_EVENT_PARAM: content }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_oversized() {
        let big = format!("{{\"dhId\":\"1\",\"pad\":\"{}\"}}", "x".repeat(MAX_JSON_LEN));
        assert!(matches!(
            parse_json_object(&big),
            Err(DAudioError::ParamInvalid { .. })
        ));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(parse_json_object("[1,2]").is_err());
        assert!(parse_json_object("not json").is_err());
        assert!(parse_json_object("").is_err());
    }

    #[test]
    fn test_dh_id_forms() {
        assert_eq!(parse_dh_id_from_event(r#"{"dhId":"1"}"#), Some(1));
        assert_eq!(parse_dh_id_from_event(r#"{"dhId":134217729}"#), Some(134217729));
        assert_eq!(parse_dh_id_from_event(r#"{"devId":"abc"}"#), None);
        assert_eq!(parse_dh_id_from_event(r#"{"dhId":"x"}"#), None);
    }

    #[test]
    fn test_get_i32_missing_key() {
        let map = parse_json_object(r#"{"dhId":"1"}"#).unwrap();
        assert!(matches!(
            get_i32(&map, KEY_RESULT),
            Err(DAudioError::NotFoundKey { .. })
        ));
    }

    #[test]
    fn test_with_dh_id() {
        let merged = with_dh_id(2, r#"{"volumeLevel":5}"#);
        let map = parse_json_object(&merged).unwrap();
        assert_eq!(get_dh_id(&map).unwrap(), 2);
        assert_eq!(get_i32(&map, KEY_VOLUME_LEVEL).unwrap(), 5);

        let wrapped = with_dh_id(1, "EVENT_TYPE=1");
        let map = parse_json_object(&wrapped).unwrap();
        assert_eq!(map[KEY_EVENT_PARAM], "EVENT_TYPE=1");
    }
}
