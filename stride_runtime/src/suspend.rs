//! Suspension points shared by the interpreter, built-ins and host commands.
//!
//! Every suspendable operation is a [`Task`]. A task suspends by awaiting a
//! [`Suspend`] obtained from a [`Yielder`]: the signal is parked in the
//! yielder and the task returns `Pending` once, handing control back to
//! whoever polls it. Awaiting a nested task from inside another one needs no
//! extra machinery, its suspensions surface through the same poll.

use std::{
    cell::Cell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::LocalBoxFuture;

pub type Task<'a, T> = LocalBoxFuture<'a, T>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// A step boundary, paced by the driver
    Step,
    /// An explicit request to wait for the given duration
    Wait(Duration),
}

#[derive(Clone, Debug, Default)]
pub struct Yielder {
    slot: Rc<Cell<Option<Signal>>>,
}

impl Yielder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Suspend {
        self.suspend(Signal::Step)
    }

    pub fn wait(&self, duration: Duration) -> Suspend {
        self.suspend(Signal::Wait(duration))
    }

    pub fn suspend(&self, signal: Signal) -> Suspend {
        Suspend {
            slot: self.slot.clone(),
            signal: Some(signal),
        }
    }

    /// Takes the signal raised by the last suspension, if any.
    pub fn take(&self) -> Option<Signal> {
        self.slot.take()
    }
}

#[derive(Debug)]
#[must_use = "suspension only happens when awaited"]
pub struct Suspend {
    slot: Rc<Cell<Option<Signal>>>,
    signal: Option<Signal>,
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.signal.take() {
            Some(signal) => {
                self.slot.set(Some(signal));
                // Ready to continue as soon as the driver polls again
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{task::noop_waker, FutureExt};

    #[test]
    fn nested_suspensions_surface_in_order() {
        let yielder = Yielder::new();
        let inner = {
            let y = yielder.clone();
            async move {
                y.wait(Duration::from_millis(5)).await;
                1
            }
        };
        let y = yielder.clone();
        let mut task: Task<'_, i32> = async move {
            y.step().await;
            inner.await + 1
        }
        .boxed_local();

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(task.as_mut().poll(&mut cx).is_pending());
        assert_eq!(yielder.take(), Some(Signal::Step));
        assert!(task.as_mut().poll(&mut cx).is_pending());
        assert_eq!(yielder.take(), Some(Signal::Wait(Duration::from_millis(5))));
        assert_eq!(task.as_mut().poll(&mut cx), Poll::Ready(2));
        assert_eq!(yielder.take(), None);
    }
}
