/// Fixed-capacity ring buffer with a next-write cursor.
///
/// Once full, every push overwrites the oldest element. Reads go
/// newest-first, which is the order caches built on top of it need.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    head: u32,
    count: u32,
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    /// Create a new ring buffer with all elements set to the given value.
    /// This is const-compatible and can be used for static initialization.
    #[inline(always)]
    pub const fn new_with(value: T) -> Self {
        Self {
            data: [value; N],
            head: 0,
            count: 0,
        }
    }

    /// Returns the current number of elements in the buffer.
    #[inline(always)]
    pub const fn len(&self) -> u32 {
        self.count
    }

    #[inline(always)]
    pub const fn capacity(&self) -> u32 {
        N as u32
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline(always)]
    pub const fn is_full(&self) -> bool {
        self.count >= N as u32
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// Write at the cursor and advance it, overwriting the oldest element when full.
    #[inline(always)]
    pub fn push_overwrite(&mut self, value: T) {
        if N == 0 {
            return;
        }
        self.data[self.head as usize] = value;
        self.head = (self.head + 1) % N as u32;
        if self.count < N as u32 {
            self.count += 1;
        }
    }

    /// Walk the stored elements from the most recent push backwards.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        let head = self.head as usize;
        (1..=self.count as usize).map(move |back| &self.data[(head + N - back) % N])
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    #[inline(always)]
    pub fn new() -> Self {
        Self::new_with(T::default())
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
