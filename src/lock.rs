use crate::*;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;

static HELD: Lazy<Mutex<HashSet<String>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-scoped exclusivity guard, held for the lifetime of a bridge.
/// Released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    name: String,
}

impl ProcessLock {
    /// Lock name derived from the current process id.
    pub fn default_name() -> String {
        format!("flydrop-{}", std::process::id())
    }

    /// Take the named lock, failing if anyone in this process holds it.
    pub(crate) fn acquire<N: Into<String>>(name: N) -> Result<Self> {
        let name = name.into();
        if !HELD.lock().insert(name.clone()) {
            return Err(Error::InitializationFailure(format!(
                "lock `{}` is already held by another bridge",
                name
            )));
        }
        tracing::debug!(%name, "process lock acquired");
        Ok(Self { name })
    }

    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        HELD.lock().remove(&self.name);
        tracing::debug!(name = %self.name, "process lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_until_dropped() {
        let name = "flydrop-test-lock-exclusive";
        let lock = ProcessLock::acquire(name).unwrap();
        assert_eq!(name, lock.name());
        assert!(matches!(
            ProcessLock::acquire(name),
            Err(Error::InitializationFailure(_))
        ));
        drop(lock);
        let _again = ProcessLock::acquire(name).unwrap();
    }

    #[test]
    fn default_name_is_per_process() {
        assert_eq!(
            format!("flydrop-{}", std::process::id()),
            ProcessLock::default_name()
        );
    }
}
