//! Event streams for session observers

use parking_lot::Mutex;
use std::sync::Arc;
use stormwatch_core::{EventReporter, SessionEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Fans session events out to every open [`EventStream`]
#[derive(Debug)]
pub(crate) struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
    task: JoinHandle<()>,
}

impl EventHub {
    /// Start the dispatcher; components report through the returned reporter
    pub(crate) fn start() -> (Self, EventReporter) {
        let (reporter, mut receiver) = EventReporter::channel();
        let subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let targets = subscribers.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                trace!("Dispatching event: {}", event.event_type());
                targets
                    .lock()
                    .retain(|subscriber| subscriber.send(event.clone()).is_ok());
            }
        });

        (Self { subscribers, task }, reporter)
    }

    /// Open a stream receiving every event reported from now on
    pub(crate) fn subscribe(&self) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        EventStream::new(receiver)
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Narrow this stream to events matching `filter`
    pub fn filtered(self, filter: EventFilter) -> FilteredEventStream {
        FilteredEventStream::new(self, filter)
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include subscription and frame events
    pub include_stream_events: bool,
    /// Whether to include history poll events
    pub include_history_events: bool,
    /// Whether to include device enumeration events
    pub include_device_events: bool,
    /// Whether to include notification events
    pub include_notification_events: bool,
    /// Whether to include events carrying an error
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_stream_events: true,
            include_history_events: true,
            include_device_events: true,
            include_notification_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    fn none() -> Self {
        Self {
            include_stream_events: false,
            include_history_events: false,
            include_device_events: false,
            include_notification_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Only subscription and frame events
    pub fn stream_only() -> Self {
        Self {
            include_stream_events: true,
            ..Self::none()
        }
    }

    /// Only history poll events
    pub fn history_only() -> Self {
        Self {
            include_history_events: true,
            ..Self::none()
        }
    }

    /// Only notification events
    pub fn notification_only() -> Self {
        Self {
            include_notification_events: true,
            ..Self::none()
        }
    }

    /// Only events that carry an error, from any component
    pub fn errors_only() -> Self {
        Self {
            include_error_events: true,
            ..Self::none()
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            specific_event_types: Some(event_types),
            ..Self::none()
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &SessionEvent) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_stream_events && event.is_stream_event())
            || (self.include_history_events && event.is_history_event())
            || (self.include_device_events && event.is_device_event())
            || (self.include_notification_events && event.is_notification_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<SessionEvent> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next filtered event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Update the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
