//! Bookkeeping of contexts that intend to share display lists and textures.
//!
//! Context creation in a windowing environment is asynchronous, so two
//! contexts can request sharing before either of them exists natively. The
//! registry remembers the intent and hands out an already created member of
//! the group when a sibling finally gets created.

use std::sync::{Arc, Mutex, Weak};

use crate::context::ContextInner;

/// Registry of share groups, owned by the display.
///
/// Sharing setup and teardown is rare next to rendering, so every operation
/// serializes on one coarse lock. Members are held weakly; the registry is
/// never the reason a context stays alive.
#[derive(Debug, Default)]
pub(crate) struct ShareRegistry {
    groups: Mutex<Vec<ShareGroup>>,
}

/// One group of contexts sharing server side objects.
///
/// Members are partitioned by whether their native context currently exists.
/// The `uncreated` partition holds both contexts that were never created and
/// ones that have been destroyed; only `created` members can be wired as a
/// native share source.
#[derive(Debug, Default)]
struct ShareGroup {
    created: Vec<Weak<ContextInner>>,
    uncreated: Vec<Weak<ContextInner>>,
}

impl ShareGroup {
    fn contains(&self, context: *const ContextInner) -> bool {
        self.created
            .iter()
            .chain(self.uncreated.iter())
            .any(|member| member.as_ptr() == context)
    }

    fn prune(&mut self) {
        self.created.retain(|member| member.strong_count() > 0);
        self.uncreated.retain(|member| member.strong_count() > 0);
    }

    fn is_empty(&self) -> bool {
        self.created.is_empty() && self.uncreated.is_empty()
    }
}

impl ShareRegistry {
    /// Record that `a` and `b` intend to share, merging their existing
    /// groups when either is already registered. Registering the same pair
    /// again is a no-op.
    pub(crate) fn register_sharing(&self, a: &Arc<ContextInner>, b: &Arc<ContextInner>) {
        let mut groups = self.groups.lock().unwrap();
        for group in groups.iter_mut() {
            group.prune();
        }
        groups.retain(|group| !group.is_empty());

        let group_a = groups.iter().position(|group| group.contains(Arc::as_ptr(a)));
        let group_b = groups.iter().position(|group| group.contains(Arc::as_ptr(b)));

        match (group_a, group_b) {
            (Some(index_a), Some(index_b)) if index_a == index_b => (),
            (Some(index_a), Some(index_b)) => {
                // Merge the later group into the earlier one.
                let (keep, fold) = (index_a.min(index_b), index_a.max(index_b));
                let folded = groups.swap_remove(fold);
                groups[keep].created.extend(folded.created);
                groups[keep].uncreated.extend(folded.uncreated);
            },
            (Some(index), None) => groups[index].uncreated.push(Arc::downgrade(b)),
            (None, Some(index)) => groups[index].uncreated.push(Arc::downgrade(a)),
            (None, None) => groups.push(ShareGroup {
                created: Vec::new(),
                uncreated: vec![Arc::downgrade(a), Arc::downgrade(b)],
            }),
        }
    }

    /// Some already created context in `context`'s share group other than
    /// `context` itself, usable as the native share source at creation time.
    pub(crate) fn share_context_for(&self, context: &ContextInner) -> Option<Arc<ContextInner>> {
        let ptr = context as *const ContextInner;
        let groups = self.groups.lock().unwrap();
        let group = groups.iter().find(|group| group.contains(ptr))?;

        group
            .created
            .iter()
            .filter(|member| member.as_ptr() != ptr)
            .find_map(|member| member.upgrade())
    }

    /// Move `context` into the created partition of its group.
    pub(crate) fn context_created(&self, context: &ContextInner) {
        let ptr = context as *const ContextInner;
        let mut groups = self.groups.lock().unwrap();
        let Some(group) = groups.iter_mut().find(|group| group.contains(ptr)) else {
            // Contexts that never requested sharing are not registered.
            return;
        };

        let position = group.uncreated.iter().position(|member| member.as_ptr() == ptr);
        let position =
            position.expect("share group corruption: created a context already marked created");
        let member = group.uncreated.swap_remove(position);
        group.created.push(member);
    }

    /// Move `context` back into the uncreated partition of its group.
    pub(crate) fn context_destroyed(&self, context: &ContextInner) {
        let ptr = context as *const ContextInner;
        let mut groups = self.groups.lock().unwrap();
        let Some(group) = groups.iter_mut().find(|group| group.contains(ptr)) else {
            return;
        };

        let position = group.created.iter().position(|member| member.as_ptr() == ptr);
        let position =
            position.expect("share group corruption: destroyed a context that was never created");
        let member = group.created.swap_remove(position);
        group.uncreated.push(member);
    }
}
