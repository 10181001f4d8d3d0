use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("tutorchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("tutorchat.client.request_errors");

pub(crate) static STREAM_FRAMES: Counter = Counter::new("tutorchat.stream.frames");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("tutorchat.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("tutorchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("tutorchat.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("tutorchat.stream.ttfb_seconds");

pub(crate) static CHAT_SENDS: Counter = Counter::new("tutorchat.chat.sends");
pub(crate) static CHAT_REJECTED: Counter = Counter::new("tutorchat.chat.rejected");
pub(crate) static CHAT_FAILURES: Counter = Counter::new("tutorchat.chat.failures");
pub(crate) static CHAT_TIMEOUTS: Counter = Counter::new("tutorchat.chat.timeouts");
pub(crate) static CHAT_TURN_DURATION: Moments =
    Moments::new("tutorchat.chat.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);

    collector.register_counter(&CHAT_SENDS);
    collector.register_counter(&CHAT_REJECTED);
    collector.register_counter(&CHAT_FAILURES);
    collector.register_counter(&CHAT_TIMEOUTS);
    collector.register_moments(&CHAT_TURN_DURATION);
}
