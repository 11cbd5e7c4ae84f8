//! Capture context propagation
//!
//! Tags, trace ids and the owning pipeline instance travel with the logical
//! call chain rather than with the thread. Each chain holds an immutable
//! [`CaptureScope`] snapshot in a tokio task-local frame, so two sibling
//! futures running on the same worker pool never observe each other's tags.
//!
//! Block-scoped usage goes through [`with_scope`] / [`with_instance`].
//! Session-style usage goes through [`enter_scope`] / [`exit_scope`]: inside a
//! frame they push and pop on that frame; outside any frame they operate on
//! the process-wide session root that new chains inherit from.

use crate::types::Tags;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

tokio::task_local! {
    static FRAME: RefCell<Frame>;
}

static SESSION: RwLock<Option<Arc<CaptureScope>>> = parking_lot::const_rwlock(None);

struct Frame {
    current: Arc<CaptureScope>,
    /// Depth of the scope that installed this frame; never popped below
    floor: usize,
}

/// One nested tag/trace/instance context
#[derive(Debug, Clone, Default)]
pub struct CaptureScope {
    tags: Tags,
    trace_id: Option<String>,
    instance_id: Option<Uuid>,
    parent: Option<Arc<CaptureScope>>,
    depth: usize,
}

impl CaptureScope {
    fn child(
        parent: Option<Arc<CaptureScope>>,
        tags: Tags,
        trace_id: Option<String>,
        instance_id: Option<Uuid>,
    ) -> Arc<Self> {
        let (mut merged, inherited_trace, inherited_instance, depth) = match &parent {
            Some(p) => (p.tags.clone(), p.trace_id.clone(), p.instance_id, p.depth + 1),
            None => (Tags::new(), None, None, 1),
        };
        merged.extend(tags);

        Arc::new(Self {
            tags: merged,
            trace_id: trace_id.or(inherited_trace),
            instance_id: instance_id.or(inherited_instance),
            parent,
            depth,
        })
    }

    /// Tags visible in this scope, enclosing scopes included
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn instance_id(&self) -> Option<Uuid> {
        self.instance_id
    }

    pub fn parent(&self) -> Option<&Arc<CaptureScope>> {
        self.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// The innermost scope visible to the calling chain
pub fn current_scope() -> Option<Arc<CaptureScope>> {
    FRAME
        .try_with(|frame| frame.borrow().current.clone())
        .ok()
        .or_else(|| SESSION.read().clone())
}

pub fn current_tags() -> Tags {
    current_scope()
        .map(|scope| scope.tags.clone())
        .unwrap_or_default()
}

pub fn current_trace_id() -> Option<String> {
    current_scope().and_then(|scope| scope.trace_id.clone())
}

pub fn current_instance_id() -> Option<Uuid> {
    current_scope().and_then(|scope| scope.instance_id)
}

async fn enter_frame<F>(scope: Arc<CaptureScope>, fut: F) -> F::Output
where
    F: Future,
{
    let floor = scope.depth;
    FRAME
        .scope(
            RefCell::new(Frame {
                current: scope,
                floor,
            }),
            fut,
        )
        .await
}

/// Run `fut` with `tags` merged over the enclosing scope's tags
///
/// Inner keys win on conflict. `trace_id` falls back to the closest
/// enclosing one when `None`.
pub async fn with_scope<F>(tags: Tags, trace_id: Option<String>, fut: F) -> F::Output
where
    F: Future,
{
    let scope = CaptureScope::child(current_scope(), tags, trace_id, None);
    enter_frame(scope, fut).await
}

/// Run `fut` owned by the pipeline instance `instance_id`
pub async fn with_instance<F>(instance_id: Uuid, fut: F) -> F::Output
where
    F: Future,
{
    let scope = CaptureScope::child(current_scope(), Tags::new(), None, Some(instance_id));
    enter_frame(scope, fut).await
}

/// Synchronous counterpart of [`with_scope`]
pub fn with_scope_sync<R>(tags: Tags, trace_id: Option<String>, f: impl FnOnce() -> R) -> R {
    let scope = CaptureScope::child(current_scope(), tags, trace_id, None);
    let floor = scope.depth;
    FRAME.sync_scope(
        RefCell::new(Frame {
            current: scope,
            floor,
        }),
        f,
    )
}

/// Push a scope that stays active until [`exit_scope`]
pub fn enter_scope(tags: Tags, trace_id: Option<String>) {
    let pushed = FRAME.try_with(|frame| {
        let mut frame = frame.borrow_mut();
        let child = CaptureScope::child(Some(frame.current.clone()), tags.clone(), trace_id.clone(), None);
        frame.current = child;
    });

    if pushed.is_err() {
        let mut session = SESSION.write();
        let child = CaptureScope::child(session.clone(), tags, trace_id, None);
        *session = Some(child);
    }
}

/// Pop the scope pushed by the last [`enter_scope`]
///
/// Returns false when there is nothing to pop. Scopes installed by
/// [`with_scope`] are left to their block.
pub fn exit_scope() -> bool {
    let popped = FRAME.try_with(|frame| {
        let mut frame = frame.borrow_mut();
        if frame.current.depth <= frame.floor {
            return false;
        }
        match frame.current.parent.clone() {
            Some(parent) => {
                frame.current = parent;
                true
            }
            None => false,
        }
    });

    match popped {
        Ok(popped) => popped,
        Err(_) => {
            let mut session = SESSION.write();
            match session.take() {
                Some(scope) => {
                    *session = scope.parent.clone();
                    true
                }
                None => false,
            }
        }
    }
}

/// `tokio::spawn` that carries a snapshot of the current scope into the task
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match FRAME.try_with(|frame| frame.borrow().current.clone()) {
        Ok(scope) => tokio::spawn(enter_frame(scope, fut)),
        Err(_) => tokio::spawn(fut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use std::time::Duration;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    #[serial]
    async fn test_nested_scopes_merge_tags() {
        let seen = with_scope(tags(&[("person", "A")]), None, async {
            with_scope(tags(&[("company", "B")]), None, async {
                tokio::task::yield_now().await;
                current_tags()
            })
            .await
        })
        .await;

        assert_eq!(seen, tags(&[("person", "A"), ("company", "B")]));
    }

    #[tokio::test]
    #[serial]
    async fn test_inner_tags_win_and_trace_falls_back() {
        with_scope(tags(&[("env", "outer")]), Some("trace-1".into()), async {
            with_scope(tags(&[("env", "inner")]), None, async {
                assert_eq!(current_tags().get("env"), Some(&json!("inner")));
                assert_eq!(current_trace_id().as_deref(), Some("trace-1"));
            })
            .await;
            assert_eq!(current_tags().get("env"), Some(&json!("outer")));
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn test_sibling_scopes_are_isolated() {
        let first = with_scope(tags(&[("person", "A")]), None, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            with_scope(tags(&[("company", "B")]), None, async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                current_tags()
            })
            .await
        });
        let second = with_scope(tags(&[("person", "X")]), None, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            current_tags()
        });

        let (first, second) = futures::join!(first, second);
        assert_eq!(first, tags(&[("person", "A"), ("company", "B")]));
        assert_eq!(second, tags(&[("person", "X")]));
    }

    #[tokio::test]
    #[serial]
    async fn test_enter_and_exit_inside_frame() {
        with_scope(tags(&[("a", "1")]), None, async {
            enter_scope(tags(&[("b", "2")]), Some("t".into()));
            tokio::task::yield_now().await;
            assert_eq!(current_tags(), tags(&[("a", "1"), ("b", "2")]));
            assert_eq!(current_trace_id().as_deref(), Some("t"));

            assert!(exit_scope());
            assert_eq!(current_tags(), tags(&[("a", "1")]));
            // The block-scoped frame itself cannot be popped
            assert!(!exit_scope());
        })
        .await;
    }

    #[test]
    #[serial]
    fn test_session_scope_outside_any_frame() {
        enter_scope(tags(&[("session", "s1")]), None);
        assert_eq!(current_tags(), tags(&[("session", "s1")]));

        let nested = with_scope_sync(tags(&[("k", "v")]), None, current_tags);
        assert_eq!(nested, tags(&[("session", "s1"), ("k", "v")]));

        assert!(exit_scope());
        assert!(current_tags().is_empty());
        assert!(!exit_scope());
    }

    #[tokio::test]
    #[serial]
    async fn test_instance_id_and_spawn_snapshot() {
        let id = Uuid::new_v4();
        let spawned = with_instance(id, async {
            assert_eq!(current_instance_id(), Some(id));
            spawn(async { current_instance_id() }).await.unwrap()
        })
        .await;

        assert_eq!(spawned, Some(id));
        assert_eq!(current_instance_id(), None);
    }
}
