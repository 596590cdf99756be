//! Users, groups and the per-machine registry.

use crate::{CapabilitySet, RegistryError};
use serde::{Deserialize, Serialize};

/// Name of the administrative account.
pub const ROOT_USER: &str = "root";

/// Name of the unprivileged account every fresh machine starts logged in as.
pub const TEST_USER: &str = "test_user";

/// Key under which the registry is written to machine metadata.
pub const USER_REGISTRY_DESIGNATION: &str = "user_registry";

/// An account on a simulated machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name, unique per registry.
    pub username: String,
    /// Simulated credential. Never used for host authentication.
    pub credential: String,
    /// Permissions granted to processes this user launches.
    pub capabilities: CapabilitySet,
    /// Names of groups the user belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    /// Creates a user with no group memberships.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        credential: impl Into<String>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
            capabilities,
            groups: Vec::new(),
        }
    }

    /// Whether the user is in `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// A named group of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    /// Group name, unique per registry.
    pub name: String,
}

impl UserGroup {
    /// Creates a group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Serialize, Deserialize)]
struct RegistryPayload {
    users: Vec<User>,
    groups: Vec<UserGroup>,
    current: Option<String>,
}

/// Users and groups of one machine.
///
/// Lookups return `None` on a miss; inserts refuse duplicates. Ordering
/// is insertion order, which is also the order written to metadata.
#[derive(Debug, Clone)]
pub struct UserRegistry {
    users: Vec<User>,
    groups: Vec<UserGroup>,
    current: Option<String>,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl UserRegistry {
    /// Empty registry with no current user.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            groups: Vec::new(),
            current: None,
        }
    }

    /// Registry seeded with `root` and `test_user`, logged in as `test_user`.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            users: vec![
                User::new(ROOT_USER, ROOT_USER, CapabilitySet::root()),
                User::new(TEST_USER, "123", CapabilitySet::user_default()),
            ],
            groups: Vec::new(),
            current: Some(TEST_USER.to_string()),
        }
    }

    /// Looks up a user.
    #[must_use]
    pub fn get_user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == name)
    }

    /// Looks up a group.
    #[must_use]
    pub fn get_group(&self, name: &str) -> Option<&UserGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Looks up a user, treating a miss as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UserNotFound`] on a miss.
    pub fn require_user(&self, name: &str) -> Result<&User, RegistryError> {
        self.get_user(name)
            .ok_or_else(|| RegistryError::UserNotFound(name.to_string()))
    }

    /// Adds a user.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateUser`] if the name is taken.
    pub fn add_user(&mut self, user: User) -> Result<(), RegistryError> {
        if self.get_user(&user.username).is_some() {
            return Err(RegistryError::DuplicateUser(user.username));
        }
        self.users.push(user);
        Ok(())
    }

    /// Adds a group.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateGroup`] if the name is taken.
    pub fn add_group(&mut self, group: UserGroup) -> Result<(), RegistryError> {
        if self.get_group(&group.name).is_some() {
            return Err(RegistryError::DuplicateGroup(group.name));
        }
        self.groups.push(group);
        Ok(())
    }

    /// Removes a user. Returns the removed user, if any.
    ///
    /// Removing the current user logs them out.
    pub fn remove_user(&mut self, name: &str) -> Option<User> {
        let idx = self.users.iter().position(|u| u.username == name)?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Some(self.users.remove(idx))
    }

    /// Removes a group and drops it from every member's list.
    pub fn remove_group(&mut self, name: &str) -> Option<UserGroup> {
        let idx = self.groups.iter().position(|g| g.name == name)?;
        for user in &mut self.users {
            user.groups.retain(|g| g != name);
        }
        Some(self.groups.remove(idx))
    }

    /// Adds `user` to `group`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if either side is missing.
    pub fn join_group(&mut self, user: &str, group: &str) -> Result<(), RegistryError> {
        if self.get_group(group).is_none() {
            return Err(RegistryError::GroupNotFound(group.to_string()));
        }
        let entry = self
            .users
            .iter_mut()
            .find(|u| u.username == user)
            .ok_or_else(|| RegistryError::UserNotFound(user.to_string()))?;
        if !entry.in_group(group) {
            entry.groups.push(group.to_string());
        }
        Ok(())
    }

    /// Switches the current user.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UserNotFound`] if no such user exists.
    pub fn set_current_user(&mut self, name: &str) -> Result<(), RegistryError> {
        self.require_user(name)?;
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Currently logged-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.current.as_deref().and_then(|n| self.get_user(n))
    }

    /// The `root` account, if it has not been removed.
    #[must_use]
    pub fn root(&self) -> Option<&User> {
        self.get_user(ROOT_USER)
    }

    /// All users in insertion order.
    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// All groups in insertion order.
    #[must_use]
    pub fn groups(&self) -> &[UserGroup] {
        &self.groups
    }

    /// Encodes the registry as a single-line payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Codec`] if encoding fails.
    pub fn to_payload(&self) -> Result<String, RegistryError> {
        let payload = RegistryPayload {
            users: self.users.clone(),
            groups: self.groups.clone(),
            current: self.current.clone(),
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Replaces this registry's contents with a decoded payload.
    ///
    /// On error the registry is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Codec`] if `text` is not a valid payload.
    pub fn apply_payload(&mut self, text: &str) -> Result<(), RegistryError> {
        let payload: RegistryPayload = serde_json::from_str(text)?;
        self.users = payload.users;
        self.groups = payload.groups;
        self.current = payload
            .current
            .filter(|name| self.users.iter().any(|u| &u.username == name));
        Ok(())
    }
}
