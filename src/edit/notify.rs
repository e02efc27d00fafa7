// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Change notification without lifetime-coupled listener objects.
//!
//! Listeners are plain closures registered for an opaque token; the caller
//! owns the token and deregisters with it. Dispatch is not re-entrant: a
//! notification fired from inside a listener is deferred until the
//! outermost dispatch unwinds.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

pub struct Notifier<E> {
    listeners: RefCell<Vec<(u64, Rc<dyn Fn(&E)>)>>,
    next_token: Cell<u64>,
    dispatching: Cell<bool>,
    deferred: RefCell<VecDeque<E>>,
}

impl<E> Default for Notifier<E> {
    fn default() -> Notifier<E> {
        Notifier::new()
    }
}

impl<E> Notifier<E> {
    pub fn new() -> Notifier<E> {
        Notifier {
            listeners: RefCell::new(Vec::new()),
            next_token: Cell::new(0),
            dispatching: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub fn register<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(&E) + 'static,
    {
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        self.listeners.borrow_mut().push((token, Rc::new(listener)));
        ListenerToken(token)
    }

    /// Removes a listener. Returns false if the token was already gone.
    pub fn deregister(&self, token: ListenerToken) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|&(t, _)| t != token.0);
        listeners.len() != before
    }

    /// Notifies all listeners. Nested calls from inside a listener enqueue
    /// the event; it is dispatched when the current dispatch completes.
    pub fn notify(&self, event: E) {
        if self.dispatching.get() {
            self.deferred.borrow_mut().push_back(event);
            return;
        }

        self.dispatching.set(true);
        self.dispatch(&event);
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            match next {
                Some(event) => self.dispatch(&event),
                None => break,
            }
        }
        self.dispatching.set(false);
    }

    fn dispatch(&self, event: &E) {
        // snapshot so listeners may register or deregister while running
        let snapshot: Vec<Rc<dyn Fn(&E)>> = self
            .listeners
            .borrow()
            .iter()
            .map(|&(_, ref listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_register_and_deregister() {
        let notifier: Notifier<i32> = Notifier::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let token = notifier.register(move |&e| sink.borrow_mut().push(e));
        notifier.notify(1);
        assert!(notifier.deregister(token));
        notifier.notify(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(!notifier.deregister(token));
    }

    #[test]
    fn test_nested_notifications_deferred() {
        let notifier: Rc<Notifier<i32>> = Rc::new(Notifier::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let inner = notifier.clone();
        let sink = seen.clone();
        notifier.register(move |&e| {
            sink.borrow_mut().push(e);
            if e == 1 {
                // fired mid-dispatch; must arrive after the current event
                // finishes with every listener
                inner.notify(2);
            }
        });
        let sink = seen.clone();
        notifier.register(move |&e| sink.borrow_mut().push(e * 10));

        notifier.notify(1);
        assert_eq!(*seen.borrow(), vec![1, 10, 2, 20]);
    }
}
