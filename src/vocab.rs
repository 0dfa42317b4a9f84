use std::collections::HashMap;

use crate::error::{Error, Result};

/// Converts between words and integer ids.
///
/// Ids 0 and 1 are reserved for the sequence delimiters; the search core only
/// ever consumes those two constants. Everything else here serves the callers
/// that encode sources and detokenize outputs.
pub struct Vocab {
    i2w: Vec<String>,
    w2i: HashMap<String, u32>,
    frozen: bool,
    unk: Option<u32>,
}

impl Vocab {
    /// Reserved id of the start-of-sequence token.
    pub const SS: u32 = 0;
    /// Reserved id of the end-of-sequence token. Producing it is the only
    /// natural termination signal a strategy reacts to.
    pub const ES: u32 = 1;

    pub const SS_STR: &'static str = "<s>";
    pub const ES_STR: &'static str = "</s>";
    pub const UNK_STR: &'static str = "<unk>";

    /// Empty, unfrozen vocabulary holding only the reserved entries.
    pub fn new() -> Self {
        let mut vocab = Self {
            i2w: Vec::new(),
            w2i: HashMap::new(),
            frozen: false,
            unk: None,
        };
        vocab.push_word(Self::SS_STR);
        vocab.push_word(Self::ES_STR);
        vocab
    }

    /// Frozen vocabulary over `words`, which must not contain the reserved
    /// entries (those always occupy ids 0 and 1).
    pub fn from_words<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for word in words {
            let word = word.into();
            if word == Self::SS_STR || word == Self::ES_STR || word == Self::UNK_STR {
                return Err(Error::Vocab {
                    reason: format!("word list contains the reserved word {word:?}"),
                });
            }
            vocab.push_word(&word);
        }
        vocab.frozen = true;
        Ok(vocab)
    }

    fn push_word(&mut self, word: &str) -> u32 {
        let id = self.i2w.len() as u32;
        self.i2w.push(word.to_owned());
        self.w2i.insert(word.to_owned(), id);
        id
    }

    /// Id for `word`. Unfrozen vocabularies assign a fresh id to unseen words;
    /// frozen ones fall back to the unk token.
    pub fn convert(&mut self, word: &str) -> Result<u32> {
        if let Some(&id) = self.w2i.get(word) {
            return Ok(id);
        }
        if self.frozen {
            return self.unk.ok_or_else(|| Error::Vocab {
                reason: format!("out-of-vocabulary word {word:?} in a frozen vocabulary with no unk token"),
            });
        }
        Ok(self.push_word(word))
    }

    /// Word for `id`, if in range.
    pub fn word(&self, id: u32) -> Option<&str> {
        self.i2w.get(id as usize).map(String::as_str)
    }

    /// Id for `word`, if present. Never inserts.
    pub fn id(&self, word: &str) -> Option<u32> {
        self.w2i.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.w2i.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.i2w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2w.is_empty()
    }

    /// Mark the vocabulary as fixed, so no further words can be added.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Set the unknown-word token. Only allowed on a frozen vocabulary; the
    /// token is added if it is not already present.
    pub fn set_unk(&mut self, word: &str) -> Result<()> {
        if !self.frozen {
            return Err(Error::Vocab {
                reason: "set_unk on an unfrozen vocabulary".to_owned(),
            });
        }
        let id = match self.w2i.get(word) {
            Some(&id) => id,
            None => self.push_word(word),
        };
        self.unk = Some(id);
        Ok(())
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}
