//! The effective permission set of a principal.

use std::collections::HashMap;

use crate::rbac::models::{Permission, PermissionWithMeta};

/// An unordered set of permissions, compared by `(target, action)`.
///
/// Each member keeps the metadata it arrived with. Metadata is carried for
/// display only and plays no part in membership or equality.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    permissions: HashMap<Permission, PermissionWithMeta>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from wire keys, skipping entries that do not parse.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|k| Permission::parse(k.as_ref()))
            .collect()
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.permissions.contains_key(permission)
    }

    /// Add a bare permission. Returns `false` if it was already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.insert_with_meta(PermissionWithMeta::new(permission))
    }

    /// Add a permission with its metadata. An existing member keeps the
    /// metadata it already has.
    pub fn insert_with_meta(&mut self, permission: PermissionWithMeta) -> bool {
        match self.permissions.entry(permission.permission.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(permission);
                true
            }
        }
    }

    /// Metadata stored for `permission`.
    pub fn meta(&self, permission: &Permission) -> Option<&PermissionWithMeta> {
        self.permissions.get(permission)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.keys()
    }

    /// Members with their metadata, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &PermissionWithMeta> {
        self.permissions.values()
    }

    /// Members with their metadata, sorted by key.
    pub fn to_vec(&self) -> Vec<PermissionWithMeta> {
        let mut entries: Vec<PermissionWithMeta> = self.permissions.values().cloned().collect();
        entries.sort_by(|a, b| a.permission.cmp(&b.permission));
        entries
    }

    /// Union of `self` and `other`. Metadata from `self` wins on overlap.
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        let mut union = self.clone();
        union.extend(other.entries().cloned());
        union
    }

    /// Permission keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.permissions.keys().map(Permission::key).collect();
        keys.sort();
        keys
    }
}

impl PartialEq for PermissionSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|p| other.contains(p))
    }
}

impl Eq for PermissionSet {}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        iter.into_iter().map(PermissionWithMeta::new).collect()
    }
}

impl FromIterator<PermissionWithMeta> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionWithMeta>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<T: IntoIterator<Item = Permission>>(&mut self, iter: T) {
        for permission in iter {
            self.insert(permission);
        }
    }
}

impl Extend<PermissionWithMeta> for PermissionSet {
    fn extend<T: IntoIterator<Item = PermissionWithMeta>>(&mut self, iter: T) {
        for permission in iter {
            self.insert_with_meta(permission);
        }
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Permission;
    type IntoIter = std::collections::hash_map::Keys<'a, Permission, PermissionWithMeta>;

    fn into_iter(self) -> Self::IntoIter {
        self.permissions.keys()
    }
}
