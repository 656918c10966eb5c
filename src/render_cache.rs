//! Deduplicates writes to a cell renderer within one draw pass.
//!
//! The cache is per view, not per row: cells are drawn one after another, so
//! only the value most recently written to the renderer can be skipped.

#[derive(Debug, Clone)]
pub struct RenderCache<T> {
    last_applied: Option<T>,
}

impl<T> Default for RenderCache<T> {
    fn default() -> Self {
        Self { last_applied: None }
    }
}

impl<T: PartialEq + Clone> RenderCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_apply(&self, value: &T) -> bool {
        self.last_applied.as_ref() != Some(value)
    }

    /// Calls `apply` unless `value` equals the last applied value.
    pub fn apply_if_changed(&mut self, value: &T, apply: impl FnOnce(&T)) -> bool {
        if !self.should_apply(value) {
            return false;
        }
        apply(value);
        self.last_applied = Some(value.clone());
        true
    }

    /// Always applies and forgets the cached value.
    ///
    /// For values produced by draw-time transforms whose inputs are not all
    /// part of `value`.
    pub fn apply_uncached(&mut self, value: &T, apply: impl FnOnce(&T)) {
        apply(value);
        self.last_applied = None;
    }

    pub fn invalidate(&mut self) {
        self.last_applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_is_applied_once() {
        let mut cache = RenderCache::new();
        let mut applied = Vec::new();
        for _ in 0..2 {
            cache.apply_if_changed(&"markup".to_string(), |value| applied.push(value.clone()));
        }
        assert_eq!(applied, vec!["markup".to_string()]);
    }

    #[test]
    fn test_differing_values_are_always_applied() {
        let mut cache = RenderCache::new();
        let mut applied = 0;
        for value in ["a", "b", "a", "a", "b"] {
            if cache.apply_if_changed(&value, |_| applied += 1) {
                assert!(!cache.should_apply(&value));
            }
        }
        assert_eq!(applied, 4);
    }

    #[test]
    fn test_uncached_apply_resets_deduplication() {
        let mut cache = RenderCache::new();
        let mut applied = 0;
        cache.apply_if_changed(&1, |_| applied += 1);
        cache.apply_uncached(&2, |_| applied += 1);
        cache.apply_uncached(&2, |_| applied += 1);
        cache.apply_if_changed(&1, |_| applied += 1);
        assert_eq!(applied, 4);

        cache.invalidate();
        assert!(cache.should_apply(&1));
    }
}
