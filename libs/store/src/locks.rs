// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Named exclusive advisory locks.

use std::{
    collections::BTreeSet,
    sync::{Arc, Condvar, Mutex},
};

use tracing::debug;

/// A registry of named exclusive locks.
///
/// [AdvisoryLocks::acquire] blocks until the name is free and returns an
/// owned guard, so holding a lock does not borrow the registry. The registry
/// is cheap to clone; clones share the same lock namespace.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryLocks {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    held: Mutex<BTreeSet<String>>,
    released: Condvar,
}

impl AdvisoryLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock with the given name, blocking until it is free.
    pub fn acquire(&self, name: &str) -> AdvisoryLockGuard {
        let mut held = self.inner.held.lock().unwrap();
        while held.contains(name) {
            held = self.inner.released.wait(held).unwrap();
        }
        held.insert(name.to_string());
        debug!(name, "advisory lock acquired");
        AdvisoryLockGuard {
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns true if the lock with the given name is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.inner.held.lock().unwrap().contains(name)
    }
}

/// Exclusive hold on one named lock. Dropping the guard releases the lock,
/// on every exit path.
#[derive(Debug)]
pub struct AdvisoryLockGuard {
    name: String,
    inner: Arc<Inner>,
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        let mut held = self.inner.held.lock().unwrap();
        held.remove(&self.name);
        self.inner.released.notify_all();
        debug!(name = self.name, "advisory lock released");
    }
}
