//! Repeating a request until its response is accepted

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::Result;
use crate::client::Client;
use crate::decode::{Decoded, Decoder, JsonDecoder};
use crate::request::Request;

/// Pause between two poll cycles
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(500);

/// Retries allowed after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Re-sends one request until a predicate accepts the decoded response
///
/// A sequence makes at most `max_retries + 1` attempts. Once the budget is
/// spent the last outcome is returned as is, success or failure, even if
/// the predicate never accepted it. Failed attempts are retried the same
/// way as rejected ones.
///
/// One poller drives one sequence at a time; use separate pollers for
/// concurrent sequences. [`Poller::reset`] may be called from anywhere.
pub struct Poller<T, D = JsonDecoder> {
    client: Client,
    request: Request,
    decoder: D,
    delay: Duration,
    max_retries: u32,
    attempts: AtomicU32,
    polling: AtomicBool,
    _output: PhantomData<fn() -> T>,
}

impl<T> Poller<T> {
    /// Create a poller decoding JSON responses
    pub fn new(client: Client, request: Request) -> Self {
        Self {
            client,
            request,
            decoder: JsonDecoder,
            delay: DEFAULT_POLL_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            attempts: AtomicU32::new(0),
            polling: AtomicBool::new(false),
            _output: PhantomData,
        }
    }
}

impl<T, D> Poller<T, D>
where
    T: DeserializeOwned,
    D: Decoder,
{
    /// Set the pause between cycles
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set how many retries follow the first attempt
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Decode responses with `decoder`
    pub fn decoder<D2: Decoder>(self, decoder: D2) -> Poller<T, D2> {
        Poller {
            client: self.client,
            request: self.request,
            decoder,
            delay: self.delay,
            max_retries: self.max_retries,
            attempts: AtomicU32::new(0),
            polling: AtomicBool::new(false),
            _output: PhantomData,
        }
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether a sequence is in progress
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// Return to idle and zero the attempt counter
    ///
    /// A dispatch already in flight is not aborted; its outcome counts as
    /// the first attempt of a fresh budget.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Release);
        self.polling.store(false, Ordering::Release);
    }

    /// Poll until `accept` returns true or the retry budget is spent
    ///
    /// `accept` only sees successfully decoded responses. Dropping the
    /// returned future abandons the sequence and returns the poller to idle.
    pub async fn poll<F>(&self, mut accept: F) -> Result<Decoded<T>>
    where
        F: FnMut(&Decoded<T>) -> bool,
    {
        let _sequence = Sequence {
            attempts: &self.attempts,
            polling: &self.polling,
        };

        loop {
            if self.attempts() > 0 {
                tokio::time::sleep(self.delay).await;
            }
            self.polling.store(true, Ordering::Release);

            let result = self
                .client
                .send_decoded_using::<T, D>(&self.request, &self.decoder)
                .await;
            let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
            let exhausted = attempt > self.max_retries;

            match result {
                Ok(decoded) if exhausted || accept(&decoded) => {
                    tracing::debug!(attempt, status = decoded.status(), "poll finished");
                    return Ok(decoded);
                }
                Ok(decoded) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        status = decoded.status(),
                        "poll response not accepted, retrying"
                    );
                }
                Err(error) if exhausted => {
                    tracing::debug!(attempt, error = %error, "poll gave up");
                    return Err(error);
                }
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "poll attempt failed, retrying"
                    );
                }
            }
        }
    }
}

/// Clears poll state when a sequence ends, including when it is dropped
struct Sequence<'a> {
    attempts: &'a AtomicU32,
    polling: &'a AtomicBool,
}

impl Drop for Sequence<'_> {
    fn drop(&mut self) {
        self.attempts.store(0, Ordering::Release);
        self.polling.store(false, Ordering::Release);
    }
}

impl<T, D> Poller<T, D>
where
    T: DeserializeOwned + Send + 'static,
    D: Decoder + 'static,
{
    /// Poll on a spawned task and hand the outcome to `completion`
    ///
    /// Must be called from within a tokio runtime.
    pub fn poll_with<F, C>(self: &Arc<Self>, accept: F, completion: C) -> JoinHandle<()>
    where
        F: FnMut(&Decoded<T>) -> bool + Send + 'static,
        C: FnOnce(Result<Decoded<T>>) + Send + 'static,
    {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let result = poller.poll(accept).await;
            completion(result);
        })
    }
}
