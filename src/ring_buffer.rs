//! A fixed-capacity sliding window that is always full.

/// A FIFO of exactly `capacity` elements. It starts out filled with
/// `T::default()` and every [`push`](RingBuffer::push) evicts the oldest
/// element, so the length never changes and nothing is reallocated.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Box<[T]>,
    // index of the oldest element, which is also the next slot to overwrite
    head: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// A window of `capacity` default values.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![T::default(); capacity].into_boxed_slice(),
            head: 0,
        }
    }

    /// Append `value` as the newest element and return the oldest one,
    /// which it replaces.
    pub fn push(&mut self, value: T) -> T {
        let evicted = std::mem::replace(&mut self.data[self.head], value);
        self.head = (self.head + 1) % self.data.len();
        evicted
    }

    /// Always equal to [`capacity`](RingBuffer::capacity).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Never true; a ring buffer cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The fixed number of elements.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Oldest element.
    pub fn first(&self) -> T {
        self.data[self.head]
    }

    /// Most recently pushed element (or the fill value).
    pub fn last(&self) -> T {
        let idx = (self.head + self.data.len() - 1) % self.data.len();
        self.data[idx]
    }

    /// Element `i`, counting from the oldest.
    pub fn get(&self, i: usize) -> Option<T> {
        (i < self.data.len()).then(|| self.data[(self.head + i) % self.data.len()])
    }

    /// Elements from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = T> + '_ {
        let (newer, older) = self.data.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// The newest `n` elements, oldest first. Fewer if `n` exceeds the capacity.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = T> + '_ {
        let n = n.min(self.data.len());
        self.iter().skip(self.data.len() - n)
    }

    /// Copies the window out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        let (newer, older) = self.data.split_at(self.head);
        let mut out = Vec::with_capacity(self.data.len());
        out.extend_from_slice(older);
        out.extend_from_slice(newer);
        out
    }
}
