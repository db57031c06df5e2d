//! Permission set and decision types.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Rule key that keeps a file private without any role carve-out.
pub const ALWAYS_PRIVATE: &str = "always_private";

/// Rule key that requires a same-site navigation cookie.
pub const DISABLE_HOTLINKS: &str = "disable_hotlinks";

/// The stored rule bundle controlling who may fetch a private file.
///
/// Only flags that are switched on are kept: `roles` holds the role names
/// granted access, the two named flags cover the fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSet {
    /// Roles whose holders may fetch the file.
    pub roles: BTreeSet<String>,
    /// Keep the file private even if no role is granted.
    pub always_private: bool,
    /// Require the navigation cookie in addition to a role match.
    pub disable_hotlinks: bool,
}

/// A single flag value as submitted by editors: `true`/`false` or `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
}

impl FlagValue {
    /// Whether the flag is switched on.
    #[must_use]
    pub const fn is_set(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i == 1,
        }
    }
}

impl PermissionSet {
    /// Build a permission set granting the given roles.
    #[must_use]
    pub fn for_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Build a permission set from the flat `key -> flag` form.
    ///
    /// `always_private` and `disable_hotlinks` map to their named flags,
    /// every other key is treated as a role name. Flags that are off are dropped.
    #[must_use]
    pub fn from_flags(flags: &BTreeMap<String, FlagValue>) -> Self {
        let mut set = Self::default();
        for (key, value) in flags {
            if !value.is_set() {
                continue;
            }
            match key.as_str() {
                ALWAYS_PRIVATE => set.always_private = true,
                DISABLE_HOTLINKS => set.disable_hotlinks = true,
                role => {
                    set.roles.insert(role.to_string());
                }
            }
        }
        set
    }

    /// Whether no flag at all is switched on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && !self.always_private && !self.disable_hotlinks
    }

    /// Whether storing this set makes the attachment private.
    #[must_use]
    pub fn implies_private(&self) -> bool {
        !self.is_empty()
    }

    /// Granted roles that are currently registered; unknown roles never match.
    pub fn granted_roles<'a>(
        &'a self,
        registered: &'a [String],
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.roles
            .iter()
            .filter(move |role| registered.iter().any(|r| r == *role))
            .map(String::as_str)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The requester may fetch the file.
    Allow,
    /// The requester may not fetch the file.
    Deny,
}

impl Decision {
    /// Convert a boolean verdict into a decision.
    #[must_use]
    pub const fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pairs: &[(&str, FlagValue)]) -> BTreeMap<String, FlagValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect()
    }

    #[test]
    fn test_from_flags_splits_roles_and_named_flags() {
        let set = PermissionSet::from_flags(&flags(&[
            ("editor", FlagValue::Int(1)),
            ("subscriber", FlagValue::Int(0)),
            ("always_private", FlagValue::Bool(true)),
            ("disable_hotlinks", FlagValue::Bool(false)),
        ]));

        assert_eq!(set.roles.len(), 1);
        assert!(set.roles.contains("editor"));
        assert!(set.always_private);
        assert!(!set.disable_hotlinks);
    }

    #[test]
    fn test_all_flags_off_is_public() {
        let set = PermissionSet::from_flags(&flags(&[
            ("editor", FlagValue::Int(0)),
            ("always_private", FlagValue::Bool(false)),
        ]));
        assert!(set.is_empty());
        assert!(!set.implies_private());
    }

    #[test]
    fn test_hotlink_flag_alone_implies_private() {
        let set = PermissionSet {
            disable_hotlinks: true,
            ..PermissionSet::default()
        };
        assert!(set.implies_private());
    }

    #[test]
    fn test_granted_roles_ignores_unregistered() {
        let registered = vec!["editor".to_string(), "author".to_string()];
        let set = PermissionSet::for_roles(["editor", "ghost_role"]);
        let granted: Vec<_> = set.granted_roles(&registered).collect();
        assert_eq!(granted, vec!["editor"]);
    }

    #[test]
    fn test_deserialize_typed_form_with_defaults() {
        let set: PermissionSet = serde_json::from_str(r#"{"roles":["author"]}"#).unwrap();
        assert!(set.roles.contains("author"));
        assert!(!set.always_private);
        assert!(!set.disable_hotlinks);
    }
}
