use bytes::BytesMut;
use std::fmt;

/// LIFO stack of buffers that all share one exact capacity.
///
/// The bucket does not check capacities on [Bucket::push]: the owning pool
/// only pushes buffers whose capacity equals [Bucket::size]. Popped slots keep
/// their backing storage, so churn at a steady depth never regrows the stack.
pub(crate) struct Bucket {
    size: usize,
    slots: Vec<BytesMut>,
}

impl Bucket {
    /// Creates an empty bucket for buffers of `size` bytes, with room for
    /// `reserve` buffers before the stack grows.
    pub(crate) fn new(size: usize, reserve: usize) -> Self {
        Self {
            size,
            slots: Vec::with_capacity(reserve),
        }
    }

    /// Capacity of every buffer held by this bucket.
    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    /// Number of buffers currently held.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Takes the most recently pushed buffer.
    ///
    /// `on_empty` runs when the bucket is already empty (and `None` is
    /// returned) or when this pop takes the last buffer.
    pub(crate) fn pop(&mut self, on_empty: impl FnOnce()) -> Option<BytesMut> {
        let Some(buf) = self.slots.pop() else {
            on_empty();
            return None;
        };
        if self.slots.is_empty() {
            on_empty();
        }
        Some(buf)
    }

    /// Pushes a buffer of exactly [Bucket::size] capacity.
    pub(crate) fn push(&mut self, buf: BytesMut) {
        debug_assert_eq!(buf.capacity(), self.size);
        self.slots.push(buf);
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "size: {}, len: {}", self.size, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(size: usize) -> BytesMut {
        BytesMut::zeroed(size)
    }

    #[test]
    fn test_pop_empty_signals() {
        let mut bucket = Bucket::new(10, 4);
        let mut emptied = false;
        assert!(bucket.pop(|| emptied = true).is_none());
        assert!(emptied);
    }

    #[test]
    fn test_lifo_order() {
        let mut bucket = Bucket::new(4, 4);
        let mut first = full(4);
        first[0] = 1;
        let mut second = full(4);
        second[0] = 2;
        bucket.push(first);
        bucket.push(second);
        assert_eq!(bucket.len(), 2);

        let popped = bucket.pop(|| panic!("bucket is not empty")).unwrap();
        assert_eq!(popped[0], 2);
        let popped = bucket.pop(|| {}).unwrap();
        assert_eq!(popped[0], 1);
        assert_eq!(bucket.len(), 0);
    }

    #[test]
    fn test_last_pop_signals() {
        let mut bucket = Bucket::new(10, 100);
        bucket.push(full(10));
        bucket.push(full(10));
        bucket.push(full(10));

        let mut emptied = false;
        assert!(bucket.pop(|| emptied = true).is_some());
        bucket.push(full(10));
        assert!(bucket.pop(|| emptied = true).is_some());
        assert!(bucket.pop(|| emptied = true).is_some());
        assert!(!emptied);
        assert!(bucket.pop(|| emptied = true).is_some());
        assert!(emptied);

        emptied = false;
        assert!(bucket.pop(|| emptied = true).is_none());
        assert!(emptied);
    }

    #[test]
    fn test_churn_keeps_storage() {
        let mut bucket = Bucket::new(8, 2);
        bucket.push(full(8));
        bucket.push(full(8));
        let reserved = bucket.slots.capacity();
        for _ in 0..16 {
            let buf = bucket.pop(|| {}).unwrap();
            bucket.push(buf);
        }
        assert_eq!(bucket.slots.capacity(), reserved);
    }

    #[test]
    fn test_display() {
        let mut bucket = Bucket::new(16, 1);
        bucket.push(full(16));
        assert_eq!(bucket.to_string(), "size: 16, len: 1");
    }
}
