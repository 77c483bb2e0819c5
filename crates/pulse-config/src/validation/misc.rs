//! Validation for the bus, voice, and relay sections.

use crate::schema::PulseConfig;

use super::helpers::{validate_non_empty, validate_range, validate_range_f32};

/// Validate bus constraints.
pub(crate) fn validate_bus(errors: &mut Vec<String>, config: &PulseConfig) {
    let bus = &config.bus;
    validate_non_empty(errors, "bus.url", &bus.url);
    if !bus.url.is_empty() && !(bus.url.starts_with("ws://") || bus.url.starts_with("wss://")) {
        errors.push(format!("bus.url = {} must use ws:// or wss://", bus.url));
    }
    validate_non_empty(errors, "bus.topic_scope", &bus.topic_scope);
    if bus.topic_scope.contains(['+', '#']) {
        errors.push("bus.topic_scope must not contain wildcards".into());
    }
    validate_range(errors, "bus.connect_timeout_secs", bus.connect_timeout_secs, 1, 120);
    validate_range(errors, "bus.reconnect_delay_secs", bus.reconnect_delay_secs, 1, 60);
    if bus.max_reconnect_delay_secs < bus.reconnect_delay_secs {
        errors.push(format!(
            "bus.max_reconnect_delay_secs = {} is below bus.reconnect_delay_secs = {}",
            bus.max_reconnect_delay_secs, bus.reconnect_delay_secs
        ));
    }
    validate_range(errors, "bus.max_queued", bus.max_queued as u64, 1, 65536);
}

/// Validate voice constraints.
pub(crate) fn validate_voice(errors: &mut Vec<String>, config: &PulseConfig) {
    let voice = &config.voice;
    validate_non_empty(errors, "voice.default_channel", &voice.default_channel);
    if voice.default_channel.contains(['/', '+', '#']) {
        errors.push("voice.default_channel must be a single topic level".into());
    }
    validate_range(
        errors,
        "voice.max_pending_envelopes",
        voice.max_pending_envelopes as u64,
        1,
        4096,
    );
    validate_range(
        errors,
        "voice.speaking.sample_interval_ms",
        voice.speaking.sample_interval_ms,
        10,
        1000,
    );
    validate_range(
        errors,
        "voice.speaking.window",
        voice.speaking.window as u64,
        8,
        4096,
    );
    validate_range_f32(
        errors,
        "voice.speaking.threshold",
        voice.speaking.threshold,
        0.0,
        255.0,
    );
}

/// Validate relay constraints.
pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &PulseConfig) {
    validate_non_empty(errors, "relay.host", &config.relay.host);
    validate_range(
        errors,
        "relay.hello_timeout_secs",
        config.relay.hello_timeout_secs,
        1,
        300,
    );
}
