//! Response delivery
//!
//! The link calls a single [`ResponseHandler`] from its reader thread (for
//! decoded responses) and its sweep thread (for packets that ran out of
//! retries). A handler that blocks stalls the serial receive path, so slow
//! consumers should sit behind a [`BufferedDispatcher`], which hands
//! everything to its own delivery thread.

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::protocol::Response;

/// Receives everything the badge sends back
pub trait ResponseHandler: Send + Sync {
    /// A decoded response, after the link has applied its own bookkeeping
    fn on_response(&self, response: &Response);

    /// A reliable packet was not acknowledged after every retry
    fn on_send_failure(&self, _payload: &[u8]) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ResponseHandler for NullHandler {
    fn on_response(&self, _response: &Response) {}
}

type ResponseFn = Box<dyn Fn(&Response) + Send + Sync>;
type FailureFn = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Forwards straight to closures on the calling thread
pub struct CallbackHandler {
    on_response: ResponseFn,
    on_failure: Option<FailureFn>,
}

impl CallbackHandler {
    pub fn new(on_response: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        Self {
            on_response: Box::new(on_response),
            on_failure: None,
        }
    }

    pub fn with_failure(mut self, on_failure: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(on_failure));
        self
    }
}

impl ResponseHandler for CallbackHandler {
    fn on_response(&self, response: &Response) {
        (self.on_response)(response);
    }

    fn on_send_failure(&self, payload: &[u8]) {
        if let Some(on_failure) = &self.on_failure {
            on_failure(payload);
        }
    }
}

enum Event {
    Response(Response),
    SendFailure(Vec<u8>),
}

/// Queues events and delivers them to an inner handler on a dedicated thread
///
/// Dropping the dispatcher delivers whatever is still queued, then joins
/// the thread.
pub struct BufferedDispatcher {
    sender: Option<Sender<Event>>,
    handle: Option<JoinHandle<()>>,
}

impl BufferedDispatcher {
    pub fn new(inner: impl ResponseHandler + 'static) -> Result<Self> {
        let (sender, receiver) = unbounded::<Event>();
        let handle = thread::Builder::new()
            .name("badge-dispatch".to_string())
            .spawn(move || {
                for event in receiver.iter() {
                    match event {
                        Event::Response(response) => inner.on_response(&response),
                        Event::SendFailure(payload) => inner.on_send_failure(&payload),
                    }
                }
                log::debug!("Dispatch thread exiting");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn dispatch thread: {}", e)))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn post(&self, event: Event) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                log::warn!("Dispatch thread gone, event dropped");
            }
        }
    }
}

impl ResponseHandler for BufferedDispatcher {
    fn on_response(&self, response: &Response) {
        self.post(Event::Response(response.clone()));
    }

    fn on_send_failure(&self, payload: &[u8]) {
        self.post(Event::SendFailure(payload.to_vec()));
    }
}

impl Drop for BufferedDispatcher {
    fn drop(&mut self) {
        // Closing the channel ends the delivery loop
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Dispatch thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AckSource;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn ack(cookie: u8) -> Response {
        Response::Ack {
            source: AckSource::PacketReceived,
            cookie,
        }
    }

    #[test]
    fn test_callback_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = Arc::clone(&seen);
            let failures = Arc::clone(&failures);
            CallbackHandler::new(move |r| seen.lock().push(r.clone()))
                .with_failure(move |p| failures.lock().push(p.to_vec()))
        };
        handler.on_response(&ack(1));
        handler.on_send_failure(&[7, 0]);
        assert_eq!(*seen.lock(), vec![ack(1)]);
        assert_eq!(*failures.lock(), vec![vec![7, 0]]);
    }

    #[test]
    fn test_buffered_delivers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = {
            let seen = Arc::clone(&seen);
            CallbackHandler::new(move |r| seen.lock().push(r.clone()))
        };
        let dispatcher = BufferedDispatcher::new(inner).unwrap();
        for cookie in 1..=20 {
            dispatcher.on_response(&ack(cookie));
        }
        // Drop drains the queue before joining
        drop(dispatcher);
        let seen = seen.lock();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen[0], ack(1));
        assert_eq!(seen[19], ack(20));
    }
}
