use std::cell::Cell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use agora_types::{AgoraError, Result};

/// Serializes value-moving calls and rejects re-entry from the same thread.
///
/// Other threads block until the current call finishes; a call made from inside a
/// guarded section (for example from a token transfer hook) fails with `ReentrantCall`.
#[derive(Debug, Default)]
pub struct CallGuard {
    lock: ReentrantMutex<Cell<bool>>,
}

/// Marks the guarded section; clears the flag on every exit path.
pub struct Entered<'a> {
    inner: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl CallGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Result<Entered<'_>> {
        let inner = self.lock.lock();
        if inner.get() {
            return Err(AgoraError::ReentrantCall);
        }
        inner.set(true);
        Ok(Entered { inner })
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.inner.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_enter_rejected() {
        let guard = CallGuard::new();
        let outer = guard.enter().unwrap();
        assert!(matches!(guard.enter(), Err(AgoraError::ReentrantCall)));
        drop(outer);
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_flag_cleared_on_error_path() {
        let guard = CallGuard::new();
        let run = |fail: bool| -> Result<()> {
            let _entered = guard.enter()?;
            if fail {
                return Err(AgoraError::InvalidAmount);
            }
            Ok(())
        };
        assert!(run(true).is_err());
        assert!(run(false).is_ok());
    }

    #[test]
    fn test_other_threads_wait() {
        use std::sync::Arc;
        let guard = Arc::new(CallGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.enter().map(|_| ()))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    }
}
