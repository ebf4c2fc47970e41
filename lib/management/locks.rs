//! Per-environment serialization of lifecycle operations.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// One mutex per environment name, created on first use and kept for the
/// lifetime of the process.
static ENVIRONMENT_LOCKS: LazyLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Acquires the mutation lock of an environment.
///
/// At most one deploy, update, clean or delete per name runs at a time;
/// operations on different names are unaffected. The lock is held until
/// the returned guard drops.
pub async fn lock_environment(name: &str) -> OwnedMutexGuard<()> {
    let lock = {
        let mut locks = ENVIRONMENT_LOCKS.lock().await;
        locks.entry(name.to_string()).or_default().clone()
    };

    lock.lock_owned().await
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_name_serializes_different_names_do_not() {
        let first = lock_environment("locked-env").await;

        // A second taker of the same name must wait.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            lock_environment("locked-env"),
        )
        .await;
        assert!(blocked.is_err());

        // A different name proceeds immediately.
        let other = tokio::time::timeout(
            Duration::from_millis(50),
            lock_environment("other-env"),
        )
        .await;
        assert!(other.is_ok());

        drop(first);
        let reacquired = tokio::time::timeout(
            Duration::from_millis(50),
            lock_environment("locked-env"),
        )
        .await;
        assert!(reacquired.is_ok());
    }
}
