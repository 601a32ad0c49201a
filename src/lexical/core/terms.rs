//! Term dictionary enumeration API.
//!
//! [`Terms`] gives access to the terms of one field and [`TermsEnum`] walks
//! them in sorted byte order. Enumerators can seek by term or by ordinal and
//! expose the per-term statistics and postings of the current term.

use std::borrow::Cow;

use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::CompiledAutomaton;
use crate::lexical::index::postings::{BlockTermState, Impact, PostingsEnum};

/// Result of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// The exact term was found.
    Found,
    /// The enum is positioned on the smallest term greater than the target.
    NotFound,
    /// Every term is smaller than the target.
    End,
}

/// Statistics about a term in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermStats {
    /// The term bytes
    pub term: Vec<u8>,
    /// Number of documents containing this term
    pub doc_freq: u32,
    /// Total number of occurrences across all documents
    pub total_term_freq: u64,
}

impl TermStats {
    /// The term as text, replacing invalid UTF-8.
    pub fn term_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.term)
    }
}

/// Iterator over terms in a field's term dictionary.
///
/// A fresh enumerator is unpositioned. `next` on a fresh enumerator returns
/// the first term; after `None` has been returned the enumerator is
/// exhausted and keeps returning `None`.
///
/// # Example
///
/// ```ignore
/// let mut terms_enum = field_reader.iterator()?;
/// while let Some(term) = terms_enum.next()? {
///     println!("{}", String::from_utf8_lossy(term));
/// }
/// ```
pub trait TermsEnum: Send {
    /// Advance to the next term in the enumeration.
    ///
    /// Returns `None` when there are no more terms.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Seek to the exact term. Returns `true` if the term exists.
    fn seek_exact(&mut self, target: &[u8]) -> Result<bool>;

    /// Seek to the smallest term greater than or equal to the target.
    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus>;

    /// Seek to the term with the given ordinal.
    fn seek_exact_ord(&mut self, ord: u64) -> Result<()>;

    /// The current term.
    fn term(&self) -> Result<&[u8]>;

    /// The 0-based rank of the current term.
    fn ord(&self) -> Result<u64>;

    /// Number of documents containing the current term.
    fn doc_freq(&mut self) -> Result<u32>;

    /// Total number of occurrences of the current term.
    fn total_term_freq(&mut self) -> Result<u64>;

    /// Decoded postings metadata of the current term.
    fn term_state(&mut self) -> Result<BlockTermState>;

    /// Postings of the current term.
    fn postings(&mut self) -> Result<Box<dyn PostingsEnum>>;

    /// Impact summary of the current term.
    fn impacts(&mut self) -> Result<Vec<Impact>>;

    /// Get statistics for the current term.
    fn term_stats(&mut self) -> Result<TermStats> {
        let doc_freq = self.doc_freq()?;
        let total_term_freq = self.total_term_freq()?;
        Ok(TermStats {
            term: self.term()?.to_vec(),
            doc_freq,
            total_term_freq,
        })
    }
}

// Implement TermsEnum for Box<dyn TermsEnum> to allow composition
impl<'a> TermsEnum for Box<dyn TermsEnum + 'a> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        (**self).next()
    }

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        (**self).seek_exact(target)
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        (**self).seek_ceil(target)
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        (**self).seek_exact_ord(ord)
    }

    fn term(&self) -> Result<&[u8]> {
        (**self).term()
    }

    fn ord(&self) -> Result<u64> {
        (**self).ord()
    }

    fn doc_freq(&mut self) -> Result<u32> {
        (**self).doc_freq()
    }

    fn total_term_freq(&mut self) -> Result<u64> {
        (**self).total_term_freq()
    }

    fn term_state(&mut self) -> Result<BlockTermState> {
        (**self).term_state()
    }

    fn postings(&mut self) -> Result<Box<dyn PostingsEnum>> {
        (**self).postings()
    }

    fn impacts(&mut self) -> Result<Vec<Impact>> {
        (**self).impacts()
    }
}

/// Access to the term dictionary for a specific field.
pub trait Terms: Send + Sync {
    /// Get an iterator over all terms in this field.
    fn iterator(&self) -> Result<Box<dyn TermsEnum + '_>>;

    /// Iterate the terms accepted by `compiled`, starting after `start_term`.
    fn intersect<'a>(
        &'a self,
        compiled: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum + 'a>>;

    /// Get the number of unique terms in this field.
    fn size(&self) -> u64;

    /// Get the sum of document frequencies across all terms.
    fn sum_doc_freq(&self) -> u64;

    /// Get the sum of total term frequencies across all terms.
    ///
    /// Equals [`Terms::sum_doc_freq`] for fields without frequencies.
    fn sum_total_term_freq(&self) -> u64;

    /// Number of documents that have at least one term in this field.
    fn doc_count(&self) -> u32;

    /// Check if this field has term frequencies stored.
    fn has_freqs(&self) -> bool;

    /// Smallest term in the field.
    fn min_term(&self) -> &[u8];

    /// Largest term in the field.
    fn max_term(&self) -> &[u8];
}

/// An enumerator over no terms.
#[derive(Debug, Default)]
pub struct EmptyTermsEnum;

impl TermsEnum for EmptyTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(None)
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Ok(SeekStatus::End)
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        Err(BlockTreeError::illegal_argument(format!(
            "targetOrd={ord} is out of bounds (numTerms=0)"
        )))
    }

    fn term(&self) -> Result<&[u8]> {
        Err(unpositioned())
    }

    fn ord(&self) -> Result<u64> {
        Err(unpositioned())
    }

    fn doc_freq(&mut self) -> Result<u32> {
        Err(unpositioned())
    }

    fn total_term_freq(&mut self) -> Result<u64> {
        Err(unpositioned())
    }

    fn term_state(&mut self) -> Result<BlockTermState> {
        Err(unpositioned())
    }

    fn postings(&mut self) -> Result<Box<dyn PostingsEnum>> {
        Err(unpositioned())
    }

    fn impacts(&mut self) -> Result<Vec<Impact>> {
        Err(unpositioned())
    }
}

/// Error returned when a term accessor is called while no term is current.
pub(crate) fn unpositioned() -> BlockTreeError {
    BlockTreeError::illegal_state("terms enum is not positioned on a term")
}

/// Enumerates at most one term: the given term, if the field contains it.
pub struct SingleTermsEnum<'a> {
    inner: Box<dyn TermsEnum + 'a>,
    term: Vec<u8>,
    done: bool,
    positioned: bool,
}

impl<'a> SingleTermsEnum<'a> {
    pub fn new(inner: Box<dyn TermsEnum + 'a>, term: Vec<u8>) -> Self {
        SingleTermsEnum {
            inner,
            term,
            done: false,
            positioned: false,
        }
    }
}

impl TermsEnum for SingleTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.done {
            self.positioned = false;
            return Ok(None);
        }
        self.done = true;
        if self.inner.seek_exact(&self.term)? {
            self.positioned = true;
            Ok(Some(&self.term))
        } else {
            Ok(None)
        }
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Err(BlockTreeError::illegal_state(
            "seek is not supported on an automaton terms enum",
        ))
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Err(BlockTreeError::illegal_state(
            "seek is not supported on an automaton terms enum",
        ))
    }

    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(BlockTreeError::illegal_state(
            "seek is not supported on an automaton terms enum",
        ))
    }

    fn term(&self) -> Result<&[u8]> {
        if self.positioned {
            Ok(&self.term)
        } else {
            Err(unpositioned())
        }
    }

    fn ord(&self) -> Result<u64> {
        if self.positioned {
            self.inner.ord()
        } else {
            Err(unpositioned())
        }
    }

    fn doc_freq(&mut self) -> Result<u32> {
        if !self.positioned {
            return Err(unpositioned());
        }
        self.inner.doc_freq()
    }

    fn total_term_freq(&mut self) -> Result<u64> {
        if !self.positioned {
            return Err(unpositioned());
        }
        self.inner.total_term_freq()
    }

    fn term_state(&mut self) -> Result<BlockTermState> {
        if !self.positioned {
            return Err(unpositioned());
        }
        self.inner.term_state()
    }

    fn postings(&mut self) -> Result<Box<dyn PostingsEnum>> {
        if !self.positioned {
            return Err(unpositioned());
        }
        self.inner.postings()
    }

    fn impacts(&mut self) -> Result<Vec<Impact>> {
        if !self.positioned {
            return Err(unpositioned());
        }
        self.inner.impacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_terms_enum() {
        let mut terms_enum = EmptyTermsEnum;
        assert!(terms_enum.next().unwrap().is_none());
        assert!(!terms_enum.seek_exact(b"a").unwrap());
        assert_eq!(terms_enum.seek_ceil(b"a").unwrap(), SeekStatus::End);
        assert!(terms_enum.term().is_err());
        assert!(terms_enum.seek_exact_ord(0).unwrap_err().is_usage_error());
    }

    #[test]
    fn test_term_stats_lossy() {
        let stats = TermStats {
            term: b"caf\xc3\xa9".to_vec(),
            doc_freq: 2,
            total_term_freq: 3,
        };
        assert_eq!(stats.term_lossy(), "café");
    }
}
