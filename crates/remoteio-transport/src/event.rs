use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, Status};
use crate::handle::{handle_based, Handle, HandleTable, Object, ObjectKind};
use crate::signals::Signals;

/// Signals a user may set or clear on an event.
const SETTABLE: Signals = Signals::USER_ALL.union(Signals::SIGNALED);

#[derive(Default)]
pub(crate) struct EventObject {
    asserted: Mutex<Signals>,
    changed: Condvar,
}

impl EventObject {
    fn lock(&self) -> MutexGuard<'_, Signals> {
        self.asserted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn signals(&self) -> Signals {
        *self.lock()
    }

    pub(crate) fn wait(&self, wanted: Signals) -> Result<Signals> {
        if !wanted.intersects(SETTABLE) {
            return Err(Status::BAD_STATE);
        }
        let mut asserted = self.lock();
        while !asserted.intersects(wanted) {
            asserted = self
                .changed
                .wait(asserted)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(*asserted)
    }
}

/// A user-signalable event object.
///
/// Remote servers hand one of these out with an open reply so clients can
/// wait for readiness without a round trip.
#[derive(Debug)]
pub struct Event(Handle);

handle_based!(Event, ObjectKind::Event);

impl Event {
    pub fn create(table: &Arc<HandleTable>) -> Event {
        Event(table.install(Object::Event(Arc::new(EventObject::default()))))
    }

    fn object(&self) -> &EventObject {
        match self.0.object() {
            Object::Event(event) => event,
            _ => unreachable!("Event always wraps an event handle"),
        }
    }

    /// Clear then set signals. Only the user band and `SIGNALED` may change.
    pub fn signal(&self, clear: Signals, set: Signals) -> Result<()> {
        if !SETTABLE.contains(clear | set) {
            return Err(Status::INVALID_ARGS);
        }
        let object = self.object();
        let mut asserted = object.lock();
        asserted.remove(clear);
        asserted.insert(set);
        drop(asserted);
        object.changed.notify_all();
        Ok(())
    }
}
