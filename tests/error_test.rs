use resonance::{ResonanceError, Result};

#[test]
fn test_not_found() {
    let err = ResonanceError::not_found("runner", "smoke");
    assert_eq!(err.to_string(), "未找到 runner: smoke");
}

#[test]
fn test_invalid_url() {
    let err = ResonanceError::InvalidUrl("not a url".to_string());
    assert_eq!(err.to_string(), "无效的 URL: not a url");
}

#[test]
fn test_already_running() {
    let err = ResonanceError::AlreadyRunning;
    assert!(err.to_string().contains("已有运行中的 runner"));
}

#[test]
fn test_error_conversion_from_anyhow() {
    let anyhow_err = anyhow::anyhow!("test anyhow error");
    let err: ResonanceError = anyhow_err.into();
    assert!(err.to_string().contains("test anyhow error"));
}

#[test]
fn test_error_conversion_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: ResonanceError = json_err.into();
    assert!(matches!(err, ResonanceError::JsonError(_)));
    assert!(err.to_string().starts_with("JSON 解析错误"));
}

#[test]
fn test_result_type() {
    fn returns_error() -> Result<()> {
        Err(ResonanceError::UnsupportedAlgorithm("SHA-512".to_string()))
    }

    match returns_error() {
        Err(ResonanceError::UnsupportedAlgorithm(name)) => assert_eq!(name, "SHA-512"),
        _ => panic!("Expected UnsupportedAlgorithm"),
    }
}
