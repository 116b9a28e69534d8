//! Command dispatch boundary
//!
//! Host applications drive the engine through named methods with JSON
//! arguments. Argument validation is the only failure that surfaces as a
//! structured error; engine-level failures come back as a boolean `false`
//! with the cause in the log.

use crate::error::CommandError;
use serde_json::Value;

/// Arguments accepted by `initializeWallpaper`.
///
/// `enableMouseTransparent` defaults to true: the safe mode where the
/// wallpaper never intercepts input.
pub fn parse_initialize_args(args: &Value) -> Result<(String, bool), CommandError> {
    let map = args
        .as_object()
        .ok_or_else(|| CommandError::InvalidArgs("expected an argument object".to_string()))?;

    let url = map
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CommandError::InvalidArgs("'url' is required".to_string()))?
        .to_string();

    let mouse_transparent = map
        .get("enableMouseTransparent")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok((url, mouse_transparent))
}

/// Arguments accepted by `navigateToUrl`.
pub fn parse_navigate_args(args: &Value) -> Result<String, CommandError> {
    let map = args
        .as_object()
        .ok_or_else(|| CommandError::InvalidArgs("expected an argument object".to_string()))?;

    map.get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CommandError::InvalidArgs("'url' is required".to_string()))
}

#[cfg(target_os = "windows")]
pub fn handle_command(
    engine: &mut crate::engine::WallpaperEngine,
    method: &str,
    args: &Value,
) -> Result<Value, CommandError> {
    match method {
        "initializeWallpaper" => {
            let (url, mouse_transparent) = parse_initialize_args(args)?;
            Ok(Value::Bool(engine.initialize_wallpaper(&url, mouse_transparent)))
        }
        "stopWallpaper" => Ok(Value::Bool(engine.stop_wallpaper())),
        "navigateToUrl" => {
            let url = parse_navigate_args(args)?;
            Ok(Value::Bool(engine.navigate_to_url(&url)))
        }
        other => Err(CommandError::NotImplemented(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_args_parsed() {
        let args = json!({"url": "http://localhost:3000", "enableMouseTransparent": false});
        let (url, transparent) = parse_initialize_args(&args).unwrap();
        assert_eq!(url, "http://localhost:3000");
        assert!(!transparent);
    }

    #[test]
    fn test_initialize_args_transparency_defaults_on() {
        let args = json!({"url": "http://localhost:3000"});
        let (_, transparent) = parse_initialize_args(&args).unwrap();
        assert!(transparent);
    }

    #[test]
    fn test_initialize_args_require_url() {
        assert!(parse_initialize_args(&json!({})).is_err());
        assert!(parse_initialize_args(&json!({"url": ""})).is_err());
        assert!(parse_initialize_args(&json!(42)).is_err());
    }

    #[test]
    fn test_navigate_args_require_url() {
        assert_eq!(
            parse_navigate_args(&json!({"url": "http://example.com"})).unwrap(),
            "http://example.com"
        );
        assert!(parse_navigate_args(&json!({})).is_err());
    }

    #[test]
    fn test_invalid_args_error_is_tagged() {
        let err = parse_navigate_args(&json!({})).unwrap_err();
        assert!(err.to_string().starts_with("INVALID_ARGS"));
    }
}
