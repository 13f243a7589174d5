// ABOUTME: Layered merge of configuration values from several scopes.
// ABOUTME: The tighter scope (node pool) wins; unset fields fall back to the wider scope.

/// A value that can be filled in from a wider-scoped default.
///
/// Implementations state their merge rule field by field so the inheritance
/// table stays readable independently of struct layout.
pub trait Merge {
    /// Merge with `defaults`, preferring values already set on `self`.
    fn merge(&mut self, defaults: &Self);
}

/// Marker for values merged as one unit rather than field by field.
pub trait Atomic: Clone {}

impl Atomic for bool {}
impl Atomic for i32 {}
impl Atomic for u32 {}
impl Atomic for String {}

impl<T: Atomic> Merge for Option<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_none() {
            self.clone_from(defaults);
        }
    }
}

/// Moving version of [`Merge::merge`].
pub fn merge<T: Merge>(mut overrides: T, defaults: &T) -> T {
    overrides.merge(defaults);
    overrides
}
