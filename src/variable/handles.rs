use std::num::NonZeroUsize;

// `Variable::reference` uses `0` for "no children", so a handle is the index
// in `keys` plus one.
pub struct Handles<T> {
    keys: Vec<T>,
}

impl<T> Handles<T> {
    /// Always returns a new handle, even for a key that is already known.
    pub fn create(&mut self, key: T) -> NonZeroUsize {
        self.keys.push(key);
        NonZeroUsize::new(self.keys.len()).unwrap_or(NonZeroUsize::MIN)
    }
    pub fn get(&self, id: usize) -> Option<&T> {
        id.checked_sub(1).and_then(|index| self.keys.get(index))
    }
    pub fn len(&self) -> usize {
        self.keys.len()
    }
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
    pub fn reset(&mut self) {
        self.keys.clear();
    }
}

impl<T> Default for Handles<T> {
    fn default() -> Self {
        Self { keys: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_fresh_and_one_based() {
        let mut handles = Handles::default();
        assert_eq!(handles.create("a").get(), 1);
        assert_eq!(handles.create("a").get(), 2);
        assert_eq!(handles.get(0), None);
        assert_eq!(handles.get(2), Some(&"a"));
        assert_eq!(handles.get(3), None);

        handles.reset();
        assert!(handles.is_empty());
        assert_eq!(handles.get(1), None);
    }
}
