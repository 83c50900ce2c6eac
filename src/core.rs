//! Fixed-capacity byte storage shared by the frame model and the native
//! structure layouts.
//!
//! The driver boundary exchanges inline byte arrays (frame payload, serial
//! number, hardware type, description). `FixedBytes` keeps those arrays on the
//! stack and tracks how many bytes are meaningful, exposing only the populated
//! part through slices.

/// Maximum payload carried by a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;
/// Size of the serial number field reported by the adapter.
pub const SERIAL_NUMBER_LEN: usize = 20;
/// Size of the hardware type field reported by the adapter.
pub const HARDWARE_TYPE_LEN: usize = 40;
/// Size of the description field reported by the adapter.
pub const DESCRIPTION_LEN: usize = 20;

/// Returned when a slice does not fit into a [`FixedBytes`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize> {
    len: usize,
    data: [u8; N],
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FixedBytes<N> {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; N],
        }
    }

    /// Buffer capacity in bytes.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of valid bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the buffer.
    #[inline]
    pub fn clear(&mut self) {
        self.data = [0; N];
        self.len = 0;
    }

    /// Copy a slice that must fit entirely.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, CapacityExceeded> {
        if slice.len() > N {
            return Err(CapacityExceeded {
                len: slice.len(),
                capacity: N,
            });
        }
        let mut bytes = Self::new();
        bytes.data[..slice.len()].copy_from_slice(slice);
        bytes.len = slice.len();
        Ok(bytes)
    }

    /// Copy bytes into the buffer, keeping at most `N` of them.
    ///
    /// Only meant for informational text fields; payloads go through
    /// [`FixedBytes::try_from_slice`].
    #[inline]
    pub fn copy_from_slice(&mut self, slice: &[u8]) {
        let clamped = slice.len().min(N);
        self.data = [0; N];
        self.data[..clamped].copy_from_slice(&slice[..clamped]);
        self.len = clamped;
    }

    /// Zero-filled storage of `len` bytes.
    pub fn zeroed(len: usize) -> Result<Self, CapacityExceeded> {
        if len > N {
            return Err(CapacityExceeded { len, capacity: N });
        }
        Ok(Self {
            len,
            data: [0; N],
        })
    }

    /// Read a C-style string field: the content stops at the first NUL byte.
    pub fn from_nul_padded(raw: &[u8; N]) -> Self {
        let len = raw.iter().position(|b| *b == 0).unwrap_or(N);
        let mut bytes = Self::new();
        bytes.data[..len].copy_from_slice(&raw[..len]);
        bytes.len = len;
        bytes
    }

    /// Full backing array, zero padded after the populated bytes.
    #[inline]
    pub fn to_padded(&self) -> [u8; N] {
        self.data
    }

    /// Immutable view over the populated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Mutable view over the populated bytes.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Populated bytes as text, when they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_slice()).ok()
    }
}

impl<const N: usize> AsRef<[u8]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

//==================================================================================TESTS
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_slice_rejects_oversized_input() {
        let err = FixedBytes::<8>::try_from_slice(&[0u8; 9]).unwrap_err();
        assert_eq!(err, CapacityExceeded { len: 9, capacity: 8 });

        let ok = FixedBytes::<8>::try_from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(ok.as_slice(), &[1, 2, 3]);
        assert_eq!(ok.to_padded(), [1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn copy_from_slice_clamps_and_clears_previous_content() {
        let mut text = FixedBytes::<4>::new();
        text.copy_from_slice(b"abcdef");
        assert_eq!(text.as_slice(), b"abcd");

        text.copy_from_slice(b"xy");
        assert_eq!(text.to_padded(), *b"xy\0\0");
    }

    #[test]
    fn nul_padded_fields_stop_at_first_nul() {
        let mut raw = [0u8; SERIAL_NUMBER_LEN];
        raw[..6].copy_from_slice(b"A1B2C3");
        raw[7] = b'Z';

        let serial = FixedBytes::from_nul_padded(&raw);
        assert_eq!(serial.as_str(), Some("A1B2C3"));

        let full = FixedBytes::from_nul_padded(&[b'x'; 4]);
        assert_eq!(full.len(), 4);
    }
}
