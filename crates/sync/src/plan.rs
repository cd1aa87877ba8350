use crate::diff::Diff;
use crate::policy::CopyPolicy;
use filehub_storage::FileInfo;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::Duration;

/// A single change to apply to the destination hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Copy a source-only file to the destination.
    Create(String),
    /// Overwrite a destination file with the newer source copy.
    Replace(String),
    /// Remove a destination-only file.
    Delete(String),
}

impl Action {
    pub fn path(&self) -> &str {
        match self {
            Self::Create(path) | Self::Replace(path) | Self::Delete(path) => path,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Replace(_) => "replace",
            Self::Delete(_) => "delete",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} `{}`", self.verb(), self.path())
    }
}

/// The actions a sync will take, grouped by phase.
///
/// Phases are applied in field order: every create finishes before the
/// first replace starts, and deletes run last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub create: Vec<Action>,
    pub replace: Vec<Action>,
    pub delete: Vec<Action>,
}

impl Plan {
    /// Select the actions `policy` allows from `diffs`.
    ///
    /// A file present on both hubs is only replaced when the source copy is
    /// newer than the destination copy by more than `tolerance`.
    pub fn new(diffs: &[Diff], policy: CopyPolicy, tolerance: Duration) -> Self {
        let mut plan = Self::default();
        for diff in diffs {
            match diff {
                Diff::SourceOnly(source) if policy.create => plan.create.push(Action::Create(source.path.clone())),
                Diff::Both { destination, source } if policy.replace && is_newer(source, destination, tolerance) => {
                    plan.replace.push(Action::Replace(source.path.clone()));
                },
                Diff::DestinationOnly(destination) if policy.delete => {
                    plan.delete.push(Action::Delete(destination.path.clone()));
                },
                _ => {},
            }
        }
        plan
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.replace.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the plan into its phases, in the order they must run.
    pub fn into_phases(self) -> [Vec<Action>; 3] {
        [self.create, self.replace, self.delete]
    }
}

/// `true` when `source` was modified strictly after `destination` plus
/// `tolerance`. Equal timestamps never count as newer.
pub fn is_newer(source: &FileInfo, destination: &FileInfo, tolerance: Duration) -> bool {
    destination
        .modified
        .checked_add(tolerance)
        .is_some_and(|threshold| source.modified > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use rstest::rstest;
    use time::OffsetDateTime;

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    fn info(path: &str, seconds: i64) -> FileInfo {
        FileInfo::new(path, 1, at(seconds), "test")
    }

    fn scenario() -> Vec<Diff> {
        // dst: a(t=100), b(t=100); src: b(t=200), c(t=50)
        diff(vec![info("a", 100), info("b", 100)], vec![info("b", 200), info("c", 50)]).unwrap()
    }

    #[rstest]
    #[case(200, 100, 0, true)]
    #[case(100, 100, 0, false)]
    #[case(50, 100, 0, false)]
    #[case(101, 100, 1, false)]
    #[case(102, 100, 1, true)]
    fn test_is_newer(#[case] source: i64, #[case] destination: i64, #[case] tolerance: i64, #[case] expected: bool) {
        assert_eq!(
            is_newer(&info("f", source), &info("f", destination), Duration::seconds(tolerance)),
            expected
        );
    }

    #[test]
    fn test_is_newer_overflow_never_replaces() {
        let destination = FileInfo::new("f", 1, OffsetDateTime::new_utc(time::Date::MAX, time::Time::MIDNIGHT), "t");
        assert!(!is_newer(&info("f", 0), &destination, Duration::days(2)));
    }

    #[test]
    fn test_plan_all() {
        let plan = Plan::new(&scenario(), CopyPolicy::ALL, Duration::ZERO);
        assert_eq!(plan.create, [Action::Create("c".to_string())]);
        assert_eq!(plan.replace, [Action::Replace("b".to_string())]);
        assert_eq!(plan.delete, [Action::Delete("a".to_string())]);
        assert_eq!(plan.len(), 3);
    }

    #[rstest]
    #[case(CopyPolicy::NONE, 0, 0, 0)]
    #[case(CopyPolicy::CREATE, 1, 0, 0)]
    #[case(CopyPolicy::REPLACE, 0, 1, 0)]
    #[case(CopyPolicy::DELETE, 0, 0, 1)]
    #[case(CopyPolicy::CREATE | CopyPolicy::DELETE, 1, 0, 1)]
    fn test_plan_respects_policy(
        #[case] policy: CopyPolicy,
        #[case] create: usize,
        #[case] replace: usize,
        #[case] delete: usize,
    ) {
        let plan = Plan::new(&scenario(), policy, Duration::ZERO);
        assert_eq!((plan.create.len(), plan.replace.len(), plan.delete.len()), (create, replace, delete));
        assert_eq!(plan.is_empty(), policy.is_none());
    }

    #[test]
    fn test_plan_tolerance_suppresses_replace() {
        let plan = Plan::new(&scenario(), CopyPolicy::REPLACE, Duration::seconds(100));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_into_phases_order() {
        let [create, replace, delete] = Plan::new(&scenario(), CopyPolicy::ALL, Duration::ZERO).into_phases();
        assert_eq!(create[0].verb(), "create");
        assert_eq!(replace[0].verb(), "replace");
        assert_eq!(delete[0].verb(), "delete");
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Replace("dir/b.txt".to_string()).to_string(), "replace `dir/b.txt`");
        assert_eq!(Action::Delete("a".to_string()).path(), "a");
    }
}
