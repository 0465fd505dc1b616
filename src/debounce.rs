//! Coalesces bursts of change notifications into a single refresh.

use std::{
    future::{pending, Pending},
    pin::Pin,
    time::Duration,
};

use futures::future::Either;
use tokio::time::{sleep, Sleep};

/// A one-shot, re-armable refresh timer. The first trigger after a quiet
/// period starts the delay; triggers while armed are absorbed. The owner
/// polls [`Self::timer`] (it resolves once per armed window) and calls
/// [`Self::disarm`] after running the refresh.
pub struct Debounce {
    delay: Duration,
    armed: bool,
    pub timer: Pin<Box<Either<Sleep, Pending<()>>>>,
}

impl Debounce {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: false,
            timer: Box::pin(Either::Right(pending())),
        }
    }

    /// Request a refresh. No-op while one is already armed.
    pub fn trigger(&mut self) {
        if self.armed {
            return;
        }
        self.armed = true;
        self.timer = Box::pin(Either::Left(sleep(self.delay)));
    }

    /// Clear the timer; the next trigger arms it again. Safe to call when
    /// not armed.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.timer = Box::pin(Either::Right(pending()));
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}
