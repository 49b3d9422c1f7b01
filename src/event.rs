//! Runtime events for monitoring output health.
//!
//! Events are non-fatal notifications. Playback continues after an event
//! is emitted - they exist for logging and metrics, not error handling.

use std::sync::Arc;

/// Runtime events emitted during playback.
///
/// These are informational. An underrun is recovered locally (the stream
/// plays silence until data arrives); a stream error may precede the
/// platform tearing the device down, at which point subsequent sink
/// operations start failing.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// The hardware consumed all buffered packets and is playing silence.
    ///
    /// Emitted once per starvation episode, from the platform's audio
    /// thread. Callbacks must be cheap and must not block.
    Underrun,

    /// The platform stream reported an error.
    ///
    /// This typically means the device was unplugged or claimed by
    /// another process.
    StreamError {
        /// Description of the error from the platform.
        reason: String,
    },

    /// A drain poll loop expired before all packets were consumed.
    DrainTimeout {
        /// How long the loop waited, in milliseconds.
        waited_ms: u64,
    },
}

/// Callback type for receiving runtime events.
///
/// Register via [`SinkBuilder::events()`]. May be invoked from the
/// platform audio thread, so implementations must not block.
///
/// [`SinkBuilder::events()`]: crate::SinkBuilder::events
pub type EventCallback = Arc<dyn Fn(OutputEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use audio_output::{event_callback, OutputEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(OutputEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
