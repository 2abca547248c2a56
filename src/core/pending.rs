use crate::core::Sample;

/// The latest sample that was read but deliberately not persisted.
///
/// Holds at most one sample: every buffered reading supersedes the previous one.
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct PendingBuffer(Option<Sample>);

impl PendingBuffer {
    /// Buffer the sample, returning the superseded one.
    pub fn replace(&mut self, sample: Sample) -> Option<Sample> {
        self.0.replace(sample)
    }

    #[must_use]
    pub const fn get(&self) -> Option<&Sample> {
        self.0.as_ref()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_only_the_latest() {
        let mut pending = PendingBuffer::default();
        assert!(pending.is_empty());

        let first = Sample::builder().device_id("a").build();
        let second = Sample::builder().device_id("b").build();
        assert!(pending.replace(first.clone()).is_none());
        assert_eq!(pending.replace(second.clone()), Some(first));
        assert_eq!(pending.get(), Some(&second));

        pending.clear();
        assert!(pending.is_empty());
    }
}
