use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("groqchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("groqchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("groqchat.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("groqchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("groqchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("groqchat.stream.bytes");

pub(crate) static RELAY_FRAGMENTS: Counter = Counter::new("groqchat.relay.fragments");
pub(crate) static RELAY_EMPTY_FRAGMENTS: Counter = Counter::new("groqchat.relay.empty_fragments");
pub(crate) static RELAY_FIRST_FRAGMENT: Moments =
    Moments::new("groqchat.relay.first_fragment_seconds");

pub(crate) static TURNS_COMPLETED: Counter = Counter::new("groqchat.turn.completed");
pub(crate) static TURNS_FAILED: Counter = Counter::new("groqchat.turn.failed");
pub(crate) static TURN_DURATION: Moments = Moments::new("groqchat.turn.duration_seconds");
pub(crate) static MODEL_SWITCHES: Counter = Counter::new("groqchat.session.model_switches");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&RELAY_FRAGMENTS);
    collector.register_counter(&RELAY_EMPTY_FRAGMENTS);
    collector.register_moments(&RELAY_FIRST_FRAGMENT);

    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_moments(&TURN_DURATION);
    collector.register_counter(&MODEL_SWITCHES);
}
