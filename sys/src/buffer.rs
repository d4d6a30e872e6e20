use crate::*;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Plain element types a [NativeBuffer] may be reinterpreted as.
/// Every bit pattern of the right size must be a valid value.
pub trait Element: sealed::Sealed + Copy + 'static {}

macro_rules! element {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}
        impl Element for $t {}
    )*};
}

element!(
    u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, usize, isize, f32, f64
);

/// A read-only, non-owning view over memory handed to us by the native
/// library during a callback.
///
/// The memory belongs to the native allocator and may be reclaimed the
/// moment the callback returns, so the lifetime `'a` never outlives the
/// callback invocation. Copy out anything you need to keep.
#[derive(Clone, Copy)]
pub struct NativeBuffer<'a> {
    ptr: *const u8,
    len: usize,
    _p: PhantomData<&'a [u8]>,
}

// the view is read-only, sharing it across threads is as safe as &[u8]
unsafe impl Send for NativeBuffer<'_> {}
unsafe impl Sync for NativeBuffer<'_> {}

impl<'a> NativeBuffer<'a> {
    /// Wrap a raw pointer / length pair.
    ///
    /// A null pointer is treated as an empty buffer regardless of `len`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for all of `'a`, and
    /// nothing may write through it during that time.
    pub unsafe fn from_raw(ptr: *const u8, len: usize) -> Self {
        let len = if ptr.is_null() { 0 } else { len };
        Self {
            ptr,
            len,
            _p: PhantomData,
        }
    }

    /// View an existing rust slice as a native buffer.
    pub fn from_slice(s: &'a [u8]) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
            _p: PhantomData,
        }
    }

    /// Byte length of the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the region holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The region as bytes, without copying.
    pub fn as_bytes(&self) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The region as utf8 text, without copying.
    pub fn as_str(&self) -> Result<&'a str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }

    /// Reinterpret the region as a sequence of `T`, without copying.
    pub fn cast<T: Element>(&self) -> Result<&'a [T]> {
        let size = std::mem::size_of::<T>();
        if self.len % size != 0 {
            return Err(Error::SizeMismatch {
                len: self.len,
                size,
            });
        }
        if self.len == 0 {
            return Ok(&[]);
        }
        let align = std::mem::align_of::<T>();
        if self.ptr as usize % align != 0 {
            return Err(Error::Misaligned { align });
        }
        Ok(unsafe {
            std::slice::from_raw_parts(self.ptr as *const T, self.len / size)
        })
    }

    /// Copy the region out into owned memory.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl std::fmt::Debug for NativeBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
