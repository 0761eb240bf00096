//! User directory - Who is which age group
//!
//! The gateway only needs to resolve a user to an age group and to record
//! administrative changes. Embedding applications plug in their own account
//! store by implementing [`UserDirectory`].

use dashmap::DashMap;
use nestguard_core::AgeGroup;

/// Resolves users to age groups
pub trait UserDirectory: Send + Sync {
    /// Age group of a known user; `None` if the user is unknown
    fn age_group(&self, user_id: &str) -> Option<AgeGroup>;

    /// Record a new age group, returning the previous one
    fn set_age_group(&self, user_id: &str, age_group: AgeGroup) -> Option<AgeGroup>;
}

/// Directory kept in memory
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, AgeGroup>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: impl Into<String>, age_group: AgeGroup) -> Self {
        self.users.insert(user_id.into(), age_group);
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn age_group(&self, user_id: &str) -> Option<AgeGroup> {
        self.users.get(user_id).map(|entry| *entry.value())
    }

    fn set_age_group(&self, user_id: &str, age_group: AgeGroup) -> Option<AgeGroup> {
        self.users.insert(user_id.to_string(), age_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_update() {
        let dir = InMemoryUserDirectory::new().with_user("kid", AgeGroup::Child);
        assert_eq!(dir.age_group("kid"), Some(AgeGroup::Child));
        assert_eq!(dir.age_group("ghost"), None);

        assert_eq!(dir.set_age_group("kid", AgeGroup::Teen), Some(AgeGroup::Child));
        assert_eq!(dir.age_group("kid"), Some(AgeGroup::Teen));
        assert_eq!(dir.set_age_group("new", AgeGroup::Adult), None);
        assert_eq!(dir.len(), 2);
    }
}
