//! Tracking Context
//!
//! The tracking context records which effect is currently running. This
//! enables automatic dependency collection: when a wrapped container or a
//! boxed reference is read, the runtime subscribes the innermost running
//! effect to the key that was read.
//!
//! # Implementation
//!
//! A thread-local stack holds the effects that are mid-run. Entering a run
//! pushes the effect and returns a guard; dropping the guard pops it, so the
//! stack stays balanced even when an effect body panics. Nested effects work
//! naturally: the inner effect sits above the outer one, and when it
//! finishes, the outer effect becomes the collection target again.
//!
//! The stack also answers membership queries, which is how the runtime stops
//! an effect from re-entering itself when its own body writes to a value it
//! reads.

use std::cell::{Cell, RefCell};

use super::effect::{EffectHandle, EffectId};

thread_local! {
    static EFFECT_STACK: RefCell<Vec<EffectHandle>> = RefCell::new(Vec::new());
    static PAUSE_DEPTH: Cell<usize> = Cell::new(0);
}

/// Guard that keeps an effect on the tracking stack until dropped.
///
/// Dropping pops the stack, restoring the enclosing effect (if any) as the
/// collection target. This holds through panics in the effect body.
pub(crate) struct StackFrame {
    id: EffectId,
}

impl StackFrame {
    /// Push `effect` onto the tracking stack.
    pub(crate) fn enter(effect: EffectHandle) -> Self {
        let id = effect.id();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        StackFrame { id }
    }
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we popped the frame we pushed. A mismatch means guards
            // were dropped out of order.
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.id,
                    "tracking stack mismatch: expected {:?}, got {:?}",
                    self.id,
                    effect.id()
                );
            }
        });
    }
}

/// The innermost running effect, if any.
pub(crate) fn current_effect() -> Option<EffectHandle> {
    EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Whether the effect with this ID is anywhere on the tracking stack.
pub(crate) fn on_stack(id: EffectId) -> bool {
    EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == id))
}

/// Whether reads are currently being recorded as dependencies.
///
/// True when an effect is running and tracking has not been paused.
pub fn is_tracking() -> bool {
    !paused() && EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
}

pub(crate) fn paused() -> bool {
    PAUSE_DEPTH.with(|depth| depth.get() > 0)
}

/// Guard that suppresses dependency collection until dropped.
pub(crate) struct PauseGuard(());

/// Suppress dependency collection until the returned guard drops.
///
/// Pauses nest: collection resumes only when every guard is gone.
pub(crate) fn pause_tracking() -> PauseGuard {
    PAUSE_DEPTH.with(|depth| depth.set(depth.get() + 1));
    PauseGuard(())
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        PAUSE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` with dependency collection suppressed.
///
/// Reads inside `f` do not subscribe the running effect to anything. Useful
/// for peeking at reactive state from inside an effect without depending
/// on it.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = pause_tracking();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect_with, EffectOptions};

    fn idle_effect() -> EffectHandle {
        effect_with(|| (), EffectOptions::lazy())
    }

    #[test]
    fn stack_frame_pushes_and_pops() {
        assert!(current_effect().is_none());

        let effect = idle_effect();
        {
            let _frame = StackFrame::enter(effect.clone());
            assert_eq!(current_effect().map(|e| e.id()), Some(effect.id()));
            assert!(on_stack(effect.id()));
        }

        assert!(current_effect().is_none());
        assert!(!on_stack(effect.id()));
    }

    #[test]
    fn nested_frames_restore_the_outer_effect() {
        let outer = idle_effect();
        let inner = idle_effect();

        let _outer_frame = StackFrame::enter(outer.clone());
        {
            let _inner_frame = StackFrame::enter(inner.clone());
            assert_eq!(current_effect().map(|e| e.id()), Some(inner.id()));
            assert!(on_stack(outer.id()));
        }
        assert_eq!(current_effect().map(|e| e.id()), Some(outer.id()));
        assert!(!on_stack(inner.id()));
    }

    #[test]
    fn untracked_pauses_only_for_its_scope() {
        let effect = idle_effect();
        let _frame = StackFrame::enter(effect);

        assert!(is_tracking());
        untracked(|| {
            assert!(!is_tracking());
            untracked(|| assert!(!is_tracking()));
            assert!(!is_tracking());
        });
        assert!(is_tracking());
    }

    #[test]
    fn tracking_requires_a_running_effect() {
        assert!(!is_tracking());
        untracked(|| assert!(!is_tracking()));
    }
}
