//! Addressed signaling over the bus.
//!
//! Outbound envelopes go to the recipient's signal topic. Inbound envelopes
//! are routed: delivered to an existing connection, used to create a
//! responder for a peer we have not planned yet, or dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use pulse_common::{ParticipantId, VoiceError};

use crate::bus::Bus;
use crate::protocol::{SignalingEnvelope, Topics};

/// How long signals from a departed participant are treated as stale.
/// Anything still in flight after this is long past useful.
const DEPARTED_TTL: Duration = Duration::from_secs(60);

/// What to do with an inbound envelope.
#[derive(Debug, Clone)]
pub enum Route {
    /// A connection for the sender exists; hand it the payload.
    Deliver,
    /// The signal arrived before the sender's join; open a responder.
    CreateResponder,
    /// Discard, with the reason.
    Drop(VoiceError),
}

pub struct SignalingRelay {
    local: ParticipantId,
    bus: Arc<dyn Bus>,
    topics: Topics,
    departed: HashMap<ParticipantId, Instant>,
    log_payloads: bool,
}

impl SignalingRelay {
    pub fn new(local: ParticipantId, bus: Arc<dyn Bus>, topics: Topics, log_payloads: bool) -> Self {
        Self {
            local,
            bus,
            topics,
            departed: HashMap::new(),
            log_payloads,
        }
    }

    /// The topic this participant must subscribe to for inbound signals.
    pub fn inbox_topic(&self) -> String {
        self.topics.signal_to(&self.local)
    }

    /// Publish `payload` to `to`'s signal topic.
    pub fn send_signal(&self, to: &ParticipantId, payload: serde_json::Value) {
        let envelope = SignalingEnvelope {
            from: self.local.clone(),
            to: to.clone(),
            payload,
        };
        if self.log_payloads {
            trace!(to = %to, payload = %envelope.payload, "Sending signal");
        } else {
            debug!(to = %to, "Sending signal");
        }
        self.bus.publish(&self.topics.signal_to(to), envelope.to_wire());
    }

    /// Decide what to do with an inbound envelope.
    pub fn route(&self, envelope: &SignalingEnvelope, has_connection: bool) -> Route {
        if envelope.from == self.local {
            return Route::Drop(VoiceError::IdentityCollision(envelope.from.clone()));
        }
        if envelope.to != self.local {
            return Route::Drop(VoiceError::Protocol(format!(
                "signal for {} delivered to {}",
                envelope.to, self.local
            )));
        }
        if self.is_departed(&envelope.from) {
            return Route::Drop(VoiceError::StaleSignal(envelope.from.clone()));
        }
        if self.log_payloads {
            trace!(from = %envelope.from, payload = %envelope.payload, "Routing signal");
        }
        if has_connection {
            Route::Deliver
        } else {
            Route::CreateResponder
        }
    }

    /// Remember that `id` left; its signals are stale for a while.
    /// Expired marks are pruned here so the set stays bounded.
    pub fn mark_departed(&mut self, id: &ParticipantId) {
        let now = Instant::now();
        self.departed
            .retain(|_, left_at| now.duration_since(*left_at) < DEPARTED_TTL);
        self.departed.insert(id.clone(), now);
    }

    fn is_departed(&self, id: &ParticipantId) -> bool {
        self.departed
            .get(id)
            .is_some_and(|left_at| left_at.elapsed() < DEPARTED_TTL)
    }

    /// `id` joined again; accept its signals.
    pub fn mark_joined(&mut self, id: &ParticipantId) {
        self.departed.remove(id);
    }
}
