use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::runner::{Task, TaskRunner};

/// Hands out non-owning [`WeakPtr`]s to a value that lives on a task runner.
///
/// Dropping the factory invalidates every pointer it handed out. The factory
/// and all of its pointers are bound to one runner: creating, dereferencing,
/// validity-checking, and dropping all assert that the calling thread is
/// currently executing that runner's dispatch loop. Affinity is a property of
/// where the value is used, so it is enforced at runtime, not in the type.
pub struct WeakPtrFactory<T> {
    task_runner: Arc<dyn TaskRunner>,
    is_valid: Arc<AtomicBool>,
    target: NonNull<T>,
}

// Safety: the target is only ever dereferenced on the owning runner's worker
// threads, which requires T: Sync once that runner has several workers.
unsafe impl<T: Sync> Send for WeakPtrFactory<T> {}
unsafe impl<T: Sync> Sync for WeakPtrFactory<T> {}

impl<T> WeakPtrFactory<T> {
    /// Create a factory for `target`, bound to `task_runner`.
    ///
    /// # Safety
    ///
    /// `target` must outlive the factory and every dereference of the
    /// pointers it hands out. The factory only guards against use after its
    /// own drop, not against the target moving or dying first.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that is not executing `task_runner`.
    pub unsafe fn new(task_runner: Arc<dyn TaskRunner>, target: NonNull<T>) -> Self {
        assert!(
            task_runner.is_running_on_task_runner(),
            "weak pointer factories may only be created on their task runner"
        );
        WeakPtrFactory {
            task_runner,
            is_valid: Arc::new(AtomicBool::new(true)),
            target,
        }
    }

    /// Hand out a pointer that goes invalid when this factory drops.
    ///
    /// # Panics
    ///
    /// Panics when called off the owning runner.
    pub fn weak_ptr(&self) -> WeakPtr<T> {
        assert!(
            self.task_runner.is_running_on_task_runner(),
            "weak pointers may only be created on their task runner"
        );
        WeakPtr {
            task_runner: Arc::clone(&self.task_runner),
            is_valid: Arc::clone(&self.is_valid),
            target: self.target,
        }
    }
}

impl<T> Drop for WeakPtrFactory<T> {
    fn drop(&mut self) {
        assert!(
            self.task_runner.is_running_on_task_runner(),
            "weak pointer factories may only be dropped on their task runner"
        );
        self.is_valid.store(false, Ordering::Release);
    }
}

/// Non-owning pointer to a value owned elsewhere on the same task runner.
///
/// Replacement for `std::sync::Weak` where the target is not reference
/// counted: validity is decided by the [`WeakPtrFactory`], not by a strong
/// count. May only be accessed on the task runner it was created for.
pub struct WeakPtr<T> {
    task_runner: Arc<dyn TaskRunner>,
    is_valid: Arc<AtomicBool>,
    target: NonNull<T>,
}

// Safety: as for WeakPtrFactory.
unsafe impl<T: Sync> Send for WeakPtr<T> {}
unsafe impl<T: Sync> Sync for WeakPtr<T> {}

impl<T> Clone for WeakPtr<T> {
    fn clone(&self) -> Self {
        WeakPtr {
            task_runner: Arc::clone(&self.task_runner),
            is_valid: Arc::clone(&self.is_valid),
            target: self.target,
        }
    }
}

impl<T> WeakPtr<T> {
    /// Whether the factory behind this pointer is still alive.
    ///
    /// # Panics
    ///
    /// Panics when called off the owning runner.
    pub fn is_valid(&self) -> bool {
        assert!(
            self.task_runner.is_running_on_task_runner(),
            "weak pointers may only be accessed on their task runner"
        );
        self.is_valid.load(Ordering::Acquire)
    }

    /// Borrow the target, or `None` if the factory has been dropped.
    ///
    /// # Panics
    ///
    /// Panics when called off the owning runner.
    pub fn get(&self) -> Option<&T> {
        if !self.is_valid() {
            return None;
        }
        // Safety: the factory was alive an instant ago and both it and the
        // target may only be dropped on this runner, i.e. not concurrently
        // with this task.
        Some(unsafe { self.target.as_ref() })
    }
}

/// Build a task that runs `f` against the target of `weak`, or does nothing
/// at all if the pointer has gone invalid by the time the task executes.
pub fn bind_weak<T, F>(weak: WeakPtr<T>, f: F) -> Task
where
    T: Sync + 'static,
    F: FnOnce(&T) + Send + 'static,
{
    Box::new(move || {
        if let Some(target) = weak.get() {
            f(target);
        }
    })
}
