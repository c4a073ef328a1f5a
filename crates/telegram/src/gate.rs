//! Per-user turn serialization. Updates for different users run in
//! parallel; two updates from the same user are handled strictly in order,
//! which keeps the read-modify-write onboarding queue safe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use sokoni_core::UserId;

#[derive(Default)]
pub struct UserGate {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserGate {
    /// Waits until no other turn for this user is in flight. The guard
    /// releases the user on drop. Lock entries are never evicted; the map
    /// grows with one small entry per distinct user.
    pub async fn acquire(&self, id: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(id.0.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };

        lock.lock_owned().await
    }
}
