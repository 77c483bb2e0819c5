//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Pulse Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[bus]
# url = "ws://127.0.0.1:8080"
# topic_scope = "pulse/dev/voice"
# connect_timeout_secs = 15        # 1-120
# reconnect_delay_secs = 1         # 1-60
# max_reconnect_delay_secs = 30    # >= reconnect_delay_secs
# max_queued = 512                 # 1-65536 publishes held while offline

[voice]
# default_channel = "gaming"
# display_name = ""                # empty = participant id
# avatar_ref = "avatar.png"
# max_pending_envelopes = 64       # 1-4096
# reannounce_on_join = true

[voice.speaking]
# sample_interval_ms = 50          # 10-1000
# window = 128                     # 8-4096
# threshold = 18.0                 # 0.0-255.0

[relay]
# host = "0.0.0.0"
# port = 8080
# hello_timeout_secs = 10

[logging]
# level = "INFO"                   # TRACE, DEBUG, INFO, WARN, ERROR
# log_signal_payloads = false
"##
    .to_string()
}
