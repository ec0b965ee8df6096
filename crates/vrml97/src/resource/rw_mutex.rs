//! Reader/writer lock with an upgradable read mode.
//!
//! `std::sync::RwLock` cannot turn a read guard into a write guard. Here
//! writers and upgradable readers first pass a gate that admits one of them
//! at a time, so an upgrade can release its read lock and take the write
//! lock without another writer slipping in between. Plain readers never
//! touch the gate.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct RwMutex<T> {
    gate: Mutex<()>,
    value: RwLock<T>,
}

impl<T> RwMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            gate: Mutex::new(()),
            value: RwLock::new(value),
        }
    }

    /// Shared access; any number of readers at once.
    pub fn read(&self) -> ReadGuard<'_, T> {
        ReadGuard(self.value.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Exclusive access.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        WriteGuard {
            value: self.value.write().unwrap_or_else(PoisonError::into_inner),
            _gate: gate,
        }
    }

    /// Shared access that may later become exclusive. Only one upgradable
    /// reader (or writer) holds the lock at a time; plain readers still
    /// proceed alongside it.
    pub fn upgradable_read(&self) -> UpgradableReadGuard<'_, T> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        UpgradableReadGuard {
            lock: self,
            value: self.value.read().unwrap_or_else(PoisonError::into_inner),
            gate,
        }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ReadGuard<'a, T>(RwLockReadGuard<'a, T>);

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub struct WriteGuard<'a, T> {
    // Released before the gate
    value: RwLockWriteGuard<'a, T>,
    _gate: MutexGuard<'a, ()>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

pub struct UpgradableReadGuard<'a, T> {
    lock: &'a RwMutex<T>,
    value: RwLockReadGuard<'a, T>,
    gate: MutexGuard<'a, ()>,
}

impl<'a, T> UpgradableReadGuard<'a, T> {
    /// Become the writer. Waits for the plain readers to leave; no other
    /// writer can get in first because this guard still holds the gate.
    pub fn upgrade(self) -> WriteGuard<'a, T> {
        let Self { lock, value, gate } = self;
        drop(value);
        WriteGuard {
            value: lock.value.write().unwrap_or_else(PoisonError::into_inner),
            _gate: gate,
        }
    }
}

impl<T> Deref for UpgradableReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn readers_share() {
        let lock = RwMutex::new(5);
        let a = lock.read();
        let b = lock.read();
        let upgradable = lock.upgradable_read();
        assert_eq!(*a + *b + *upgradable, 15);
    }

    #[test]
    fn upgrade_then_write() {
        let lock = RwMutex::new(vec![1, 2, 3]);
        let guard = lock.upgradable_read();
        if guard.contains(&2) {
            let mut guard = guard.upgrade();
            guard.retain(|value| *value != 2);
        }
        assert_eq!(*lock.read(), vec![1, 3]);
    }

    #[test]
    fn check_then_remove_happens_once() {
        // Every thread checks for the key and removes it if present; exactly
        // one of them may see it.
        let lock = Arc::new(RwMutex::new(Some("stream")));
        let removed = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let removed = Arc::clone(&removed);
                thread::spawn(move || {
                    let guard = lock.upgradable_read();
                    if guard.is_some() {
                        let mut guard = guard.upgrade();
                        *guard = None;
                        removed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::try_unwrap(lock).ok().unwrap().into_inner(), None);
    }

    #[test]
    fn poisoned_locks_stay_usable() {
        let lock = Arc::new(RwMutex::new(0));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write();
            panic!("poison the lock");
        })
        .join();
        *lock.write() += 1;
        assert_eq!(*lock.read(), 1);
    }
}
