//! Runs a whole group inside one process, one blocking task per member.

use crate::container::{ArrayStore, MemberContainer, SharedContainer};
use crate::core::errors::{LockstepError, Result};
use crate::group::GroupContext;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// Run `member_fn` once per member of `shared`, in parallel.
///
/// A failure on any member aborts the shared container so the others leave
/// their collective calls instead of waiting forever. The returned error is
/// the first failure that was not itself caused by the abort.
pub async fn run_group<S, T, F>(shared: Arc<SharedContainer<S>>, member_fn: F) -> Result<Vec<T>>
where
    S: ArrayStore + 'static,
    T: Send + 'static,
    F: Fn(MemberContainer<S>) -> Result<T> + Send + Sync + 'static,
{
    let member_fn = Arc::new(member_fn);
    let group_size = shared.group_size();
    info!(container = %shared.id(), group_size, "starting group");

    let mut handles = Vec::with_capacity(group_size);
    for member in shared.members()? {
        let member_fn = Arc::clone(&member_fn);
        let shared = Arc::clone(&shared);
        handles.push(tokio::task::spawn_blocking(move || {
            let index = member.member_index();
            let result = catch_unwind(AssertUnwindSafe(|| member_fn(member)))
                .unwrap_or_else(|_| {
                    Err(LockstepError::internal(format!("member {} panicked", index)))
                });
            if let Err(e) = &result {
                if !e.is_induced() {
                    error!(member = index, category = e.category(), error = %e, "member failed");
                    shared.abort(format!("member {} failed: {}", index, e));
                }
            }
            result
        }));
    }

    let mut outputs = Vec::with_capacity(group_size);
    let mut root_cause = None;
    let mut induced = None;
    for (index, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(Ok(output)) => outputs.push(output),
            Ok(Err(e)) if e.is_induced() => {
                induced.get_or_insert(e);
            }
            Ok(Err(e)) => {
                root_cause.get_or_insert(e);
            }
            Err(join_err) => {
                shared.abort(format!("member {} task failed", index));
                root_cause.get_or_insert(LockstepError::internal(format!(
                    "member {} task failed: {}",
                    index, join_err
                )));
            }
        }
    }

    if let Some(e) = root_cause.or(induced) {
        return Err(e);
    }
    info!(container = %shared.id(), group_size, "group finished");
    Ok(outputs)
}
