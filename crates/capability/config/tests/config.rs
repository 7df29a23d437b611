use ems_config::{AdapterHostConfig, AppConfig, ConfigError};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::remove_var("EMS_CHANNELS_FILE");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Missing(key)) if key == "EMS_CHANNELS_FILE"
    ));

    unsafe {
        std::env::set_var("EMS_CHANNELS_FILE", "channels.json");
        std::env::set_var("EMS_STATUS_HTTP_ADDR", "127.0.0.1:6001");
        std::env::set_var("EMS_POLL_CONCURRENCY", "4");
        std::env::set_var("EMS_STALE_AFTER_MISSES", "3");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.channels_file, "channels.json");
    assert_eq!(config.status_http_addr, "127.0.0.1:6001");
    assert_eq!(config.poll_concurrency, 4);
    assert_eq!(config.stale_after_misses, 3);
    assert_eq!(config.key_prefix, "comsrv");
    assert_eq!(config.publish_max_retries, 3);
    assert_eq!(config.rpc_max_frame_bytes, 1_048_576);
    assert_eq!(config.channel_defaults().read_timeout.as_millis(), 3_000);

    unsafe {
        std::env::set_var("EMS_POLL_CONCURRENCY", "0");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "EMS_POLL_CONCURRENCY"
    ));

    unsafe {
        std::env::set_var("EMS_POLL_CONCURRENCY", "many");
    }
    assert!(AppConfig::from_env().is_err());
    unsafe {
        std::env::remove_var("EMS_POLL_CONCURRENCY");
    }

    let host = AdapterHostConfig::from_env().expect("host config");
    assert_eq!(host.rpc_max_frame_bytes, 1_048_576);
}
