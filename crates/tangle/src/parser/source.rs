//! Cell text shared by a compiled script and its diagnostics.
//!
//! Names in the owned statement tree are `StrSlice`s: the cell text `Arc`
//! plus a byte range. Compiled cells stay `'static` and cloning them copies
//! no identifier text.

use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

#[derive(Clone)]
pub struct SourceCode(Arc<str>);

impl SourceCode {
    pub fn new(code: impl Into<Arc<str>>) -> Self {
        SourceCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turn a slice borrowed out of `self.as_str()` into an owned handle.
    ///
    /// # Panics
    /// Panics if `s` does not point into this source.
    pub fn slice_from_str(&self, s: &str) -> StrSlice {
        let offset = (s.as_ptr() as usize).wrapping_sub(self.0.as_ptr() as usize);
        assert!(
            offset <= self.0.len() && s.len() <= self.0.len() - offset,
            "string slice is not from this source"
        );
        StrSlice {
            source: self.clone(),
            range: offset..offset + s.len(),
        }
    }
}

impl fmt::Debug for SourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceCode({} bytes)", self.0.len())
    }
}

#[derive(Clone)]
pub struct StrSlice {
    source: SourceCode,
    range: Range<usize>,
}

impl StrSlice {
    pub fn as_str(&self) -> &str {
        &self.source.as_str()[self.range.clone()]
    }

    /// Byte range inside the cell text.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

impl Deref for StrSlice {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for StrSlice {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for StrSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for StrSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for StrSlice {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for StrSlice {}

impl PartialEq<&str> for StrSlice {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_from_str() {
        let source = SourceCode::new("hello world");
        let slice = source.slice_from_str(&source.as_str()[6..11]);
        assert_eq!(slice.as_str(), "world");
        assert_eq!(slice.range(), 6..11);
    }

    #[test]
    fn test_equality_ignores_position() {
        let source = SourceCode::new("xs xs");
        let first = source.slice_from_str(&source.as_str()[0..2]);
        let second = source.slice_from_str(&source.as_str()[3..5]);
        assert_eq!(first, second);
        assert_eq!(first, "xs");
    }

    #[test]
    #[should_panic(expected = "not from this source")]
    fn test_foreign_slice_panics() {
        let source = SourceCode::new("abc");
        let other = String::from("abc");
        source.slice_from_str(&other);
    }
}
