//! Current-span context propagation.
//!
//! Two independent mechanisms are provided, matching the two kinds of
//! instrumented call site:
//!
//! - [`with_span`]: an async, copy-on-write stack built on
//!   [`tokio::task_local!`]. Entering pushes a snapshot-plus-one-frame for
//!   the duration of the given future; the prior stack is restored when the
//!   future completes, panics, or is cancelled, with no explicit cleanup
//!   code required — this is the primary mechanism and the one the SDK's
//!   tracer uses.
//! - [`enter`]: a synchronous RAII guard built on a plain `thread_local!`,
//!   for sync call sites (e.g. a non-async decorator). Each OS thread has an
//!   independent stack; this mechanism is not task-aware and must not be
//!   held across an `.await` point.
//!
//! Per the data model: a child task that is spawned while a span is current
//! inherits a snapshot of the parent's stack (via [`snapshot`] +
//! [`with_snapshot`]); mutations inside the child never leak back to the
//! parent, since the child owns its own copy.

use std::cell::RefCell;
use std::future::Future;

/// A lightweight reference to a live span, sufficient to derive a child's
/// `trace_id`/`parent_span_id` without requiring the full mutable [`crate::span::Span`].
#[derive(Debug, Clone)]
pub struct SpanRef {
    /// Trace this span belongs to.
    pub trace_id: String,
    /// This span's id.
    pub span_id: String,
}

tokio::task_local! {
    static CURRENT_STACK: RefCell<Vec<SpanRef>>;
}

thread_local! {
    static SYNC_STACK: RefCell<Vec<SpanRef>> = const { RefCell::new(Vec::new()) };
}

/// The innermost span currently in scope, if any, on the async task-local
/// stack.
#[must_use]
pub fn current() -> Option<SpanRef> {
    CURRENT_STACK
        .try_with(|stack| stack.borrow().last().cloned())
        .unwrap_or(None)
}

/// A snapshot of the entire async stack, for handing to a spawned child task.
#[must_use]
pub fn snapshot() -> Vec<SpanRef> {
    CURRENT_STACK
        .try_with(|stack| stack.borrow().clone())
        .unwrap_or_default()
}

/// Run `fut` with `span` pushed onto a copy of the current async stack. The
/// prior stack is restored automatically once `fut` resolves, by construction
/// of [`tokio::task::LocalKey::scope`] — including on panic or cancellation.
pub async fn with_span<F, R>(span: SpanRef, fut: F) -> R
where
    F: Future<Output = R>,
{
    let mut stack = snapshot();
    stack.push(span);
    CURRENT_STACK.scope(RefCell::new(stack), fut).await
}

/// Run `fut` with an explicit inherited stack snapshot (used when spawning a
/// child task so it starts from the parent's view without later mutations
/// leaking back).
pub async fn with_snapshot<F, R>(stack: Vec<SpanRef>, fut: F) -> R
where
    F: Future<Output = R>,
{
    CURRENT_STACK.scope(RefCell::new(stack), fut).await
}

/// RAII guard for the synchronous, thread-local stack. Pushes on
/// construction, pops on drop — including on an unwinding panic.
pub struct SyncGuard {
    _private: (),
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        SYNC_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push `span` onto the synchronous thread-local stack; the returned guard
/// restores the prior stack when dropped.
#[must_use]
pub fn enter(span: SpanRef) -> SyncGuard {
    SYNC_STACK.with(|stack| stack.borrow_mut().push(span));
    SyncGuard { _private: () }
}

/// The innermost span on the synchronous thread-local stack, if any.
#[must_use]
pub fn current_sync() -> Option<SpanRef> {
    SYNC_STACK.with(|stack| stack.borrow().last().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_scopes_restore_on_exit() {
        assert!(current().is_none());
        let parent = SpanRef {
            trace_id: "t1".into(),
            span_id: "p".into(),
        };
        with_span(parent.clone(), async {
            assert_eq!(current().unwrap().span_id, "p");
            let child = SpanRef {
                trace_id: parent.trace_id.clone(),
                span_id: "c".into(),
            };
            with_span(child, async {
                assert_eq!(current().unwrap().span_id, "c");
            })
            .await;
            // restored after the child scope exits
            assert_eq!(current().unwrap().span_id, "p");
        })
        .await;
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn child_task_inherits_snapshot_without_leaking_back() {
        let parent = SpanRef {
            trace_id: "t1".into(),
            span_id: "p".into(),
        };
        with_span(parent, async {
            let snap = snapshot();
            let handle = tokio::spawn(with_snapshot(snap, async {
                assert_eq!(current().unwrap().span_id, "p");
                let child = SpanRef {
                    trace_id: "t1".into(),
                    span_id: "c".into(),
                };
                with_span(child, async {
                    assert_eq!(current().unwrap().span_id, "c");
                })
                .await;
            }));
            handle.await.unwrap();
            // the child's push never leaked back into the parent's stack
            assert_eq!(current().unwrap().span_id, "p");
        })
        .await;
    }

    #[test]
    fn sync_guard_restores_on_drop() {
        assert!(current_sync().is_none());
        {
            let _guard = enter(SpanRef {
                trace_id: "t".into(),
                span_id: "s".into(),
            });
            assert_eq!(current_sync().unwrap().span_id, "s");
        }
        assert!(current_sync().is_none());
    }

    #[test]
    fn sync_guard_restores_on_panic_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _guard = enter(SpanRef {
                trace_id: "t".into(),
                span_id: "s".into(),
            });
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(current_sync().is_none());
    }
}
