use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Which differences between source and destination a sync acts on.
///
/// The three flags are independent and compose with `|`:
///
/// ```
/// use filehub_sync::CopyPolicy;
///
/// let policy = CopyPolicy::CREATE | CopyPolicy::REPLACE;
/// assert!(policy.create && policy.replace && !policy.delete);
/// assert_eq!("create|replace".parse::<CopyPolicy>().unwrap(), policy);
/// assert!(CopyPolicy::NONE.is_none());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyPolicy {
    /// Copy files that only exist on the source.
    pub create: bool,
    /// Overwrite destination files when the source copy is newer.
    pub replace: bool,
    /// Remove destination files that don't exist on the source.
    pub delete: bool,
}

impl CopyPolicy {
    pub const NONE: Self = Self {
        create: false,
        replace: false,
        delete: false,
    };
    pub const CREATE: Self = Self {
        create: true,
        ..Self::NONE
    };
    pub const REPLACE: Self = Self {
        replace: true,
        ..Self::NONE
    };
    pub const DELETE: Self = Self {
        delete: true,
        ..Self::NONE
    };
    pub const ALL: Self = Self {
        create: true,
        replace: true,
        delete: true,
    };

    #[must_use]
    pub const fn is_none(self) -> bool {
        !(self.create || self.replace || self.delete)
    }

    /// Returns `true` if every flag set in `other` is also set here.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.create || !other.create) && (self.replace || !other.replace) && (self.delete || !other.delete)
    }
}

impl BitOr for CopyPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            create: self.create || rhs.create,
            replace: self.replace || rhs.replace,
            delete: self.delete || rhs.delete,
        }
    }
}
impl BitOrAssign for CopyPolicy {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl Display for CopyPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.is_none() {
            return f.write_str("none");
        }
        let flags = [(self.create, "create"), (self.replace, "replace"), (self.delete, "delete")];
        let names: Vec<&str> = flags.iter().filter(|(set, _)| *set).map(|(_, name)| *name).collect();
        f.write_str(&names.join("|"))
    }
}

impl FromStr for CopyPolicy {
    type Err = Error;

    /// Parses flag names separated by `|` or `,`, case-insensitively. `all`
    /// and `none` are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut policy = Self::NONE;
        for flag in s.split(['|', ',']).map(str::trim) {
            policy |= match flag.to_lowercase().as_str() {
                "create" => Self::CREATE,
                "replace" => Self::REPLACE,
                "delete" => Self::DELETE,
                "all" => Self::ALL,
                "none" => Self::NONE,
                _ => exn::bail!(ErrorKind::InvalidPolicy(s.to_string())),
            };
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("none", CopyPolicy::NONE)]
    #[case("create", CopyPolicy::CREATE)]
    #[case("Replace", CopyPolicy::REPLACE)]
    #[case("delete", CopyPolicy::DELETE)]
    #[case("create|delete", CopyPolicy::CREATE | CopyPolicy::DELETE)]
    #[case("create, replace", CopyPolicy::CREATE | CopyPolicy::REPLACE)]
    #[case("all", CopyPolicy::ALL)]
    #[case("create|replace|delete", CopyPolicy::ALL)]
    fn test_from_str(#[case] input: &str, #[case] expected: CopyPolicy) {
        assert_eq!(input.parse::<CopyPolicy>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("copy")]
    #[case("create|")]
    fn test_from_str_invalid(#[case] input: &str) {
        let err = input.parse::<CopyPolicy>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPolicy(_)));
    }

    #[rstest]
    #[case(CopyPolicy::NONE, "none")]
    #[case(CopyPolicy::REPLACE, "replace")]
    #[case(CopyPolicy::ALL, "create|replace|delete")]
    fn test_display(#[case] policy: CopyPolicy, #[case] expected: &str) {
        assert_eq!(policy.to_string(), expected);
        assert_eq!(expected.parse::<CopyPolicy>().unwrap(), policy);
    }

    #[test]
    fn test_flags_are_independent() {
        assert!(CopyPolicy::NONE.is_none());
        assert!(!CopyPolicy::DELETE.is_none());
        assert!(CopyPolicy::ALL.contains(CopyPolicy::CREATE | CopyPolicy::DELETE));
        assert!(!CopyPolicy::CREATE.contains(CopyPolicy::REPLACE));
        assert!(CopyPolicy::CREATE.contains(CopyPolicy::NONE));
        let mut policy = CopyPolicy::NONE;
        policy |= CopyPolicy::REPLACE;
        assert_eq!(policy, CopyPolicy::REPLACE);
    }
}
