//! Scoped byte buffer (§4.7, §9): an owned block that callers can treat as
//! transient working storage (a whole-track read, a staged write) without
//! having to reason about when it gets freed — it is released on every
//! exit path, including early returns and panics during unwinding, because
//! it is just an owned `Vec<u8>` wrapped for intent.

/// An owned byte buffer scoped to a single operation. Dropping it releases
/// the backing allocation unconditionally; there is no detach or leak path.
pub struct ScopedBuffer {
    data: Vec<u8>,
}

impl ScopedBuffer {
    /// Allocate a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0u8; len] }
    }

    /// Take ownership of an existing buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the scope and hand the caller the underlying bytes. Once
    /// called, the release-on-drop guarantee no longer applies to the
    /// returned `Vec` — this is an explicit, visible opt-out.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl std::ops::Deref for ScopedBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for ScopedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_has_expected_len() {
        let buf = ScopedBuffer::zeroed(512);
        assert_eq!(buf.len(), 512);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn mutation_visible_through_slice() {
        let mut buf = ScopedBuffer::zeroed(4);
        buf.as_mut_slice()[0] = 0xFF;
        assert_eq!(buf.as_slice()[0], 0xFF);
    }

    #[test]
    fn into_vec_preserves_contents() {
        let buf = ScopedBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(buf.into_vec(), vec![1, 2, 3]);
    }
}
