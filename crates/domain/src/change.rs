use serde::{Deserialize, Serialize};

/// A committed mutation of one entity, with the pre-image when there was one.
///
/// Metadata-store adapters build this from their own change tracking so the
/// synchronizer sees old values explicitly instead of relying on ORM history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange<T> {
    /// State before the mutation; `None` for inserts.
    pub old: Option<T>,
    /// State after the mutation.
    pub new: T,
}

impl<T> EntityChange<T> {
    /// Describes an insert.
    #[must_use]
    pub fn created(new: T) -> Self {
        Self { old: None, new }
    }

    /// Describes an update from `old` to `new`.
    #[must_use]
    pub fn updated(old: T, new: T) -> Self {
        Self { old: Some(old), new }
    }

    /// Returns whether `field` differs between the pre- and post-image.
    ///
    /// Inserts report every field as changed.
    pub fn changed<F, V>(&self, field: F) -> bool
    where
        F: Fn(&T) -> V,
        V: PartialEq,
    {
        self.old
            .as_ref()
            .is_none_or(|old| field(old) != field(&self.new))
    }
}

#[cfg(test)]
mod tests {
    use super::EntityChange;

    #[test]
    fn changed_compares_pre_and_post_image() {
        let change = EntityChange::updated(("a", 1), ("a", 2));
        assert!(!change.changed(|value| value.0));
        assert!(change.changed(|value| value.1));
        assert!(EntityChange::created(("a", 1)).changed(|value| value.0));
    }
}
