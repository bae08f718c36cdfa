use std::cell::RefCell;

/// What a recurring tick wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Timer primitive. Dropping a handle cancels its timer.
pub trait Timers: Clone + 'static {
    type Handle: 'static;

    fn every(&self, period_ms: u32, tick: Box<dyn FnMut() -> TickFlow>) -> Self::Handle;
    fn once(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Self::Handle;
}

/// Runs only the most recent call once `delay_ms` has passed without another one.
pub struct Debouncer<T: Timers> {
    timers: T,
    delay_ms: u32,
    pending: RefCell<Option<T::Handle>>,
}

impl<T: Timers> Debouncer<T> {
    pub fn new(timers: T, delay_ms: u32) -> Self {
        Self {
            timers,
            delay_ms,
            pending: RefCell::new(None),
        }
    }

    pub fn call(&self, callback: impl FnOnce() + 'static) {
        let handle = self.timers.once(self.delay_ms, Box::new(callback));
        // replacing the previous handle cancels it
        let previous = self.pending.replace(Some(handle));
        drop(previous);
    }

    pub fn cancel(&self) {
        let previous = self.pending.take();
        drop(previous);
    }
}
