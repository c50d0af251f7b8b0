//! Derivation of task progress and status from milestone state.

use crate::fields::TaskStatus;
use crate::task::Milestone;

/// Percentage of `done` over `total`, rounded half-up, in integer arithmetic.
/// Returns 0 when `total` is 0.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    // floor(100 * done / total + 1/2) == floor((200 * done + total) / (2 * total))
    let p = (200 * done.min(total) + total) / (2 * total);
    p as u8
}

pub fn status_for(progress: u8) -> TaskStatus {
    match progress {
        0 => TaskStatus::NotStarted,
        100..=u8::MAX => TaskStatus::Completed,
        _ => TaskStatus::InProgress,
    }
}

/// Compute `(progress, status)` for a milestone sequence.
pub fn recompute_progress(milestones: &[Milestone]) -> (u8, TaskStatus) {
    let done = milestones.iter().filter(|m| m.is_done()).count();
    let progress = percent(done, milestones.len());
    (progress, status_for(progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn milestones(done: usize, total: usize) -> Vec<Milestone> {
        (0..total)
            .map(|i| {
                let mut m = Milestone::new(format!("m{i}"));
                if i < done {
                    m.complete(Uuid::nil(), chrono::Utc::now());
                }
                m
            })
            .collect()
    }

    #[test]
    fn test_empty_is_not_started() {
        assert_eq!(recompute_progress(&[]), (0, TaskStatus::NotStarted));
    }

    #[test]
    fn test_quarter_then_all_done() {
        assert_eq!(recompute_progress(&milestones(1, 4)), (25, TaskStatus::InProgress));
        assert_eq!(recompute_progress(&milestones(4, 4)), (100, TaskStatus::Completed));
    }

    #[test]
    fn test_rounding_half_up() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13); // 12.5
        assert_eq!(percent(1, 200), 1); // 0.5
        assert_eq!(percent(1, 201), 0); // 0.497...
        assert_eq!(percent(199, 200), 100); // 99.5 rounds to 100
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(status_for(0), TaskStatus::NotStarted);
        assert_eq!(status_for(1), TaskStatus::InProgress);
        assert_eq!(status_for(99), TaskStatus::InProgress);
        assert_eq!(status_for(100), TaskStatus::Completed);
    }

    proptest! {
        #[test]
        fn prop_progress_matches_rounded_ratio(total in 1usize..300, done_frac in 0.0f64..=1.0) {
            let done = ((total as f64) * done_frac).floor() as usize;
            let (progress, status) = recompute_progress(&milestones(done, total));
            let expected = (100.0 * done as f64 / total as f64 + 0.5).floor() as u8;
            prop_assert_eq!(progress, expected);
            prop_assert!(progress <= 100);
            let want = match progress {
                0 => TaskStatus::NotStarted,
                100 => TaskStatus::Completed,
                _ => TaskStatus::InProgress,
            };
            prop_assert_eq!(status, want);
        }
    }
}
