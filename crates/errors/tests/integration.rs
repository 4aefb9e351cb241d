//! Integration tests for error types

use capstan_errors::*;

#[test]
fn test_error_conversion() {
    let hook_err = HookError::CreateFailed {
        event: "pre-install".into(),
        path: "templates/hooks/migrate.yaml".into(),
        message: "server rejected the object".into(),
    };
    let err: Error = hook_err.into();
    assert!(matches!(err, Error::Hook(_)));
}

#[test]
fn test_error_display() {
    let err = DeployError::DependencyCycle {
        cycle: "bar -> nginx -> bar".into(),
    };
    assert_eq!(
        err.to_string(),
        "dependency cycle detected: bar -> nginx -> bar"
    );
}

#[test]
fn test_error_clone() {
    let err = ReleaseError::UnsupportedSchema;
    let cloned = err.clone();
    assert_eq!(err.to_string(), cloned.to_string());
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_yaml_error_conversion() {
    let yaml_err = serde_yml::from_str::<std::collections::BTreeMap<String, String>>("{{oops")
        .expect_err("invalid yaml must not parse");
    let err: Error = yaml_err.into();
    assert!(matches!(err, Error::Kube(KubeError::ManifestParse { .. })));
}

#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<Vec<u32>>("not json").expect_err("must fail");
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Internal(_)));
}

#[test]
fn test_user_facing_delegation() {
    let err: Error = KubeError::ReadinessFailed {
        message: "timed out after 300s".into(),
    }
    .into();
    assert_eq!(err.user_code(), Some("kube.readiness_failed"));
    assert!(err.user_hint().is_some());
    assert!(!err.is_retryable());

    let err: Error = HookError::NotReady {
        event: "post-install".into(),
        path: "templates/hooks/smoke.yaml".into(),
        message: "pod crash-looped".into(),
    }
    .into();
    assert!(err.is_retryable());
    assert_eq!(err.user_code(), Some("hook.not_ready"));
}
