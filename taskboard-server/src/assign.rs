//! Least-loaded ("smart") assignment.
//!
//! Pure functions over the current task set. The chosen user is applied like
//! any manual assignment, through the version check, so a concurrent edit can
//! still make a smart-assign write lose.

use taskboard_proto::presence::UserId;
use taskboard_proto::task::Task;

/// Number of active (not done) tasks assigned to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// The user.
    pub user: UserId,
    /// Tasks assigned to the user whose status is not `Done`.
    pub active_tasks: usize,
}

/// Counts active tasks per candidate.
///
/// Candidates are deduplicated and returned in ascending id order, which is
/// also the tie-break order used by [`find_optimal_user`].
#[must_use]
pub fn workload_distribution(tasks: &[Task], candidates: &[UserId]) -> Vec<Workload> {
    let mut users: Vec<&UserId> = candidates.iter().collect();
    users.sort();
    users.dedup();

    users
        .into_iter()
        .map(|user| Workload {
            user: user.clone(),
            active_tasks: tasks
                .iter()
                .filter(|t| t.is_active() && t.assigned_user.as_ref() == Some(user))
                .count(),
        })
        .collect()
}

/// Picks the candidate with the fewest active tasks, ties going to the
/// smallest user id. Returns `None` when there are no candidates.
#[must_use]
pub fn find_optimal_user(tasks: &[Task], candidates: &[UserId]) -> Option<UserId> {
    // `min_by_key` keeps the first minimum, and the distribution is id-sorted.
    workload_distribution(tasks, candidates)
        .into_iter()
        .min_by_key(|w| w.active_tasks)
        .map(|w| w.user)
}
