//! Weak observer registry between a shared grid and the renderables showing it.
//!
//! The grid never owns renderables. Each renderable shares an `Invalidation`
//! cell with the grid; edits OR their dirty bits into every live cell and the
//! renderable drains them before its next upload.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::geometry::TileAttrs;

/// Stable identity of a subscribed renderable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pending buffer work for one renderable.
#[derive(Debug, Default)]
pub struct Invalidation {
    attrs: Cell<TileAttrs>,
    geometry: Cell<bool>,
}

impl Invalidation {
    pub fn mark(&self, attrs: TileAttrs, geometry: bool) {
        self.attrs.set(self.attrs.get() | attrs);
        if geometry {
            self.geometry.set(true);
        }
    }

    /// Returns and clears pending work as `(attributes, geometry)`.
    pub fn take(&self) -> (TileAttrs, bool) {
        (self.attrs.take(), self.geometry.take())
    }

    pub fn is_clean(&self) -> bool {
        self.attrs.get().is_empty() && !self.geometry.get()
    }
}

#[derive(Debug, Default)]
pub struct Subscribers {
    entries: Vec<(SubscriberId, Weak<Invalidation>)>,
}

impl Subscribers {
    pub fn register(&mut self, id: SubscriberId, cell: &Rc<Invalidation>) {
        self.prune();
        if self.entries.iter().any(|(e, _)| *e == id) {
            return;
        }
        self.entries.push((id, Rc::downgrade(cell)));
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(e, _)| *e != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries
            .iter()
            .any(|(e, w)| *e == id && w.strong_count() > 0)
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, w)| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks every live subscriber dirty; dead entries are dropped.
    pub fn notify(&mut self, attrs: TileAttrs, geometry: bool) {
        self.entries.retain(|(_, w)| match w.upgrade() {
            Some(cell) => {
                cell.mark(attrs, geometry);
                true
            }
            None => false,
        });
    }

    fn prune(&mut self) {
        self.entries.retain(|(_, w)| w.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reaches_every_live_subscriber() {
        let mut subs = Subscribers::default();
        let a = Rc::new(Invalidation::default());
        let b = Rc::new(Invalidation::default());
        subs.register(SubscriberId::next(), &a);
        subs.register(SubscriberId::next(), &b);

        subs.notify(TileAttrs::FG, false);

        assert_eq!(a.take(), (TileAttrs::FG, false));
        assert_eq!(b.take(), (TileAttrs::FG, false));
        assert!(a.is_clean());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut subs = Subscribers::default();
        let kept = Rc::new(Invalidation::default());
        {
            let gone = Rc::new(Invalidation::default());
            subs.register(SubscriberId::next(), &gone);
        }
        subs.register(SubscriberId::next(), &kept);
        subs.notify(TileAttrs::all(), true);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn unregister_stops_notifications() {
        let mut subs = Subscribers::default();
        let cell = Rc::new(Invalidation::default());
        let id = SubscriberId::next();
        subs.register(id, &cell);

        assert!(subs.unregister(id));
        assert!(!subs.unregister(id));
        subs.notify(TileAttrs::CHAR, true);
        assert!(cell.is_clean());
    }

    #[test]
    fn marks_accumulate_until_taken() {
        let cell = Invalidation::default();
        cell.mark(TileAttrs::CHAR, false);
        cell.mark(TileAttrs::BG, true);
        assert_eq!(cell.take(), (TileAttrs::CHAR | TileAttrs::BG, true));
        assert_eq!(cell.take(), (TileAttrs::empty(), false));
    }
}
