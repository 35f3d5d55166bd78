//! Status reporting.
//!
//! Every internal transition maps to exactly one [`PlayerEvent`]. Events are
//! delivered in transition order through an unbounded channel, and optionally
//! to a synchronous listener registered by the host.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::detect::MotionEvent;
use crate::endpoint::Transport;
use crate::error::TransportError;

/// Notification delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Connected(Transport),
    Disconnected,
    /// `recoverable` tells the host whether to show a retry countdown or a
    /// terminal message.
    Error {
        message: String,
        recoverable: bool,
    },
    MotionStarted,
    MotionStopped,
    /// A reconnect attempt is scheduled after `delay`.
    Reconnecting {
        transport: Transport,
        delay: Duration,
    },
}

/// Internal transitions reported by the session and negotiator.
#[derive(Debug, Clone)]
pub(crate) enum Transition {
    Connected(Transport),
    Disconnected,
    Failed(TransportError),
    NegotiationFailed(Vec<Transport>),
    Motion(MotionEvent),
    ReconnectScheduled { transport: Transport, delay: Duration },
}

impl Transition {
    pub(crate) fn to_event(&self) -> PlayerEvent {
        match self {
            Transition::Connected(transport) => PlayerEvent::Connected(*transport),
            Transition::Disconnected => PlayerEvent::Disconnected,
            Transition::Failed(err) => PlayerEvent::Error {
                message: err.to_string(),
                recoverable: err.is_recoverable(),
            },
            Transition::NegotiationFailed(attempts) => PlayerEvent::Error {
                message: crate::error::PlayerError::NoCompatibleTransport {
                    attempts: attempts.clone(),
                }
                .to_string(),
                recoverable: false,
            },
            Transition::Motion(MotionEvent::Started) => PlayerEvent::MotionStarted,
            Transition::Motion(MotionEvent::Stopped) => PlayerEvent::MotionStopped,
            Transition::ReconnectScheduled { transport, delay } => PlayerEvent::Reconnecting {
                transport: *transport,
                delay: *delay,
            },
        }
    }
}

type Listener = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Translates transitions into host notifications.
#[derive(Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<PlayerEvent>,
    listener: Option<Listener>,
}

impl StatusReporter {
    /// Create a reporter and the stream its events are delivered to.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, listener: None }, EventStream { rx })
    }

    /// Also invoke `listener` synchronously for every event.
    pub fn with_listener(mut self, listener: impl Fn(&PlayerEvent) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub(crate) fn report(&self, transition: Transition) {
        let event = transition.to_event();
        log::debug!("event: {:?}", event);
        if let Some(listener) = &self.listener {
            listener(&event);
        }
        // A host that dropped its stream only loses notifications.
        let _ = self.tx.send(event);
    }
}

/// Receiving side of the event channel.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once every reporter is gone.
    pub async fn next(&mut self) -> Option<PlayerEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<PlayerEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything delivered so far.
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn maps_each_transition_to_one_event_in_order() {
        let (reporter, mut events) = StatusReporter::channel();
        reporter.report(Transition::Connected(Transport::Mjpeg));
        reporter.report(Transition::Motion(MotionEvent::Started));
        reporter.report(Transition::Motion(MotionEvent::Stopped));
        reporter.report(Transition::Failed(TransportError::Network("reset".into())));
        reporter.report(Transition::Disconnected);

        assert_eq!(
            events.drain(),
            vec![
                PlayerEvent::Connected(Transport::Mjpeg),
                PlayerEvent::MotionStarted,
                PlayerEvent::MotionStopped,
                PlayerEvent::Error {
                    message: "network error: reset".into(),
                    recoverable: true
                },
                PlayerEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn repeated_transitions_are_not_coalesced() {
        let (reporter, mut events) = StatusReporter::channel();
        reporter.report(Transition::Disconnected);
        reporter.report(Transition::Disconnected);
        assert_eq!(events.drain().len(), 2);
    }

    #[test]
    fn negotiation_failure_is_terminal() {
        let event = Transition::NegotiationFailed(vec![Transport::JpegPoll]).to_event();
        assert_eq!(
            event,
            PlayerEvent::Error {
                message: "no compatible transport (tried jpg)".into(),
                recoverable: false
            }
        );
    }

    #[test]
    fn listener_sees_events_before_stream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (reporter, mut events) = StatusReporter::channel();
        let reporter = reporter.with_listener(move |event| sink.lock().unwrap().push(event.clone()));

        reporter.report(Transition::Connected(Transport::Hls));
        assert_eq!(*seen.lock().unwrap(), vec![PlayerEvent::Connected(Transport::Hls)]);
        assert_eq!(events.try_next(), Some(PlayerEvent::Connected(Transport::Hls)));
    }

    #[test]
    fn dropped_stream_does_not_panic() {
        let (reporter, events) = StatusReporter::channel();
        drop(events);
        reporter.report(Transition::Disconnected);
    }
}
