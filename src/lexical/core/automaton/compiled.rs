use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{Automaton, DEFAULT_MAX_DETERMINIZED_STATES};
use crate::lexical::core::terms::{EmptyTermsEnum, SingleTermsEnum, Terms, TermsEnum};

/// How a [`CompiledAutomaton`] enumerates a term dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomatonType {
    /// Accepts no terms.
    None,
    /// Accepts every term.
    All,
    /// Accepts a single term.
    Single,
    /// Anything else; enumerated by intersecting with the dictionary.
    Normal,
}

/// An automaton prepared for term dictionary intersection.
#[derive(Debug, Clone)]
pub struct CompiledAutomaton {
    kind: AutomatonType,
    automaton: Automaton,
    term: Option<Vec<u8>>,
    common_suffix: Option<Vec<u8>>,
}

impl CompiledAutomaton {
    /// Classify `automaton`. Dead states must already be removed, which is
    /// the case for everything [`crate::lexical::core::automaton::Nfa::determinize`]
    /// returns.
    pub fn new(automaton: Automaton) -> Result<Self> {
        if automaton.is_empty_language() {
            return Ok(Self::with_kind(AutomatonType::None, automaton));
        }
        if automaton.accepts_all() {
            return Ok(Self::with_kind(AutomatonType::All, automaton));
        }
        if let Some(term) = automaton.single_string() {
            let mut compiled = Self::with_kind(AutomatonType::Single, automaton);
            compiled.term = Some(term);
            return Ok(compiled);
        }

        let mut suffix = automaton
            .reverse()
            .determinize(DEFAULT_MAX_DETERMINIZED_STATES)?
            .common_prefix();
        suffix.reverse();
        let mut compiled = Self::with_kind(AutomatonType::Normal, automaton);
        compiled.common_suffix = (!suffix.is_empty()).then_some(suffix);
        Ok(compiled)
    }

    fn with_kind(kind: AutomatonType, automaton: Automaton) -> Self {
        CompiledAutomaton {
            kind,
            automaton,
            term: None,
            common_suffix: None,
        }
    }

    pub fn kind(&self) -> AutomatonType {
        self.kind
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// The accepted term of a [`AutomatonType::Single`] automaton.
    pub fn term(&self) -> Option<&[u8]> {
        self.term.as_deref()
    }

    /// Suffix shared by every accepted term, if non-empty.
    pub fn common_suffix(&self) -> Option<&[u8]> {
        self.common_suffix.as_deref()
    }

    /// Enumerate the terms of `terms` accepted by this automaton.
    pub fn terms_enum<'a, T: Terms + ?Sized>(
        &'a self,
        terms: &'a T,
    ) -> Result<Box<dyn TermsEnum + 'a>> {
        match self.kind {
            AutomatonType::None => Ok(Box::new(EmptyTermsEnum)),
            AutomatonType::All => terms.iterator(),
            AutomatonType::Single => {
                let term = self
                    .term
                    .clone()
                    .ok_or_else(|| BlockTreeError::illegal_state("single automaton without term"))?;
                Ok(Box::new(SingleTermsEnum::new(terms.iterator()?, term)))
            }
            AutomatonType::Normal => terms.intersect(self, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::core::automaton::{LevenshteinAutomaton, wildcard};

    #[test]
    fn test_classification() {
        assert_eq!(
            CompiledAutomaton::new(Automaton::empty()).unwrap().kind(),
            AutomatonType::None
        );
        assert_eq!(
            CompiledAutomaton::new(wildcard("*").unwrap()).unwrap().kind(),
            AutomatonType::All
        );

        let single = CompiledAutomaton::new(wildcard("dad").unwrap()).unwrap();
        assert_eq!(single.kind(), AutomatonType::Single);
        assert_eq!(single.term(), Some(&b"dad"[..]));

        let fuzzy = LevenshteinAutomaton::new("dad", 1)
            .unwrap()
            .to_automaton()
            .unwrap();
        assert_eq!(
            CompiledAutomaton::new(fuzzy).unwrap().kind(),
            AutomatonType::Normal
        );
    }

    #[test]
    fn test_common_suffix() {
        let compiled = CompiledAutomaton::new(wildcard("*ing").unwrap()).unwrap();
        assert_eq!(compiled.kind(), AutomatonType::Normal);
        assert_eq!(compiled.common_suffix(), Some(&b"ing"[..]));

        let compiled = CompiledAutomaton::new(Automaton::prefix(b"da")).unwrap();
        assert_eq!(compiled.common_suffix(), None);
    }
}
