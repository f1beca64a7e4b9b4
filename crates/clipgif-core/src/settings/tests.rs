use super::*;

#[test]
fn defaults_are_valid() {
    let settings = PipelineSettings::default();
    settings.validate().unwrap();
    assert_eq!(settings.relay_timeout(), Duration::from_secs(60));
    assert_eq!(settings.priority, DEFAULT_PRIORITY);
}

#[test]
fn partial_config_keeps_defaults() {
    let settings: PipelineSettings =
        serde_json::from_str(r#"{ "priority": ["fast", "fidelity"], "max_width": 480 }"#).unwrap();
    assert_eq!(settings.priority, [Backend::Fast, Backend::Fidelity]);
    assert_eq!(settings.max_width, Some(480));
    assert_eq!(settings.relay_frame_warning, 2000);
    assert!(settings.validate_output);
}

#[test]
fn rejects_bad_values() {
    let cases = [
        PipelineSettings {
            relay_timeout_ms: 0,
            ..PipelineSettings::default()
        },
        PipelineSettings {
            yield_every: 0,
            ..PipelineSettings::default()
        },
        PipelineSettings {
            priority: Vec::new(),
            ..PipelineSettings::default()
        },
        PipelineSettings {
            priority: vec![Backend::Fast, Backend::Fast],
            ..PipelineSettings::default()
        },
        PipelineSettings {
            max_height: Some(1),
            ..PipelineSettings::default()
        },
    ];
    for settings in cases {
        assert!(settings.validate().is_err(), "{settings:?}");
    }
}

#[test]
fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clipgif.json");
    let settings = PipelineSettings {
        relay_timeout_ms: 1500,
        max_height: Some(360),
        validate_output: false,
        ..PipelineSettings::default()
    };

    settings.save(&path).unwrap();
    assert_eq!(PipelineSettings::load(&path).unwrap(), settings);
}

#[test]
fn load_reports_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "priority": ["gifski"] }"#).unwrap();
    let err = PipelineSettings::load(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse settings"));

    assert!(PipelineSettings::load(&dir.path().join("missing.json")).is_err());
}
