//! Identifier interning.
//!
//! Identifiers, member names, and type names are canonicalized to small
//! integer ids ([`NameId`]) so the AST and the emitted bytecode never carry
//! string payloads for names. The table is compiler-scoped: each compilation
//! owns its own [`Names`] instance, and test isolation never depends on
//! process state.
//!
//! Id `0` is reserved. On a call instruction it marks an anonymous callee
//! that is already sitting in the destination register; a function literal
//! never carries id `0` because the parser interns the spelling
//! `<анонимная функция>` for anonymous functions instead.

use ahash::AHashMap;

/// Index into the name interner's storage.
///
/// Uses `u32` to save space; the id is what identifiers compare by. Two
/// occurrences of the same source identifier always share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct NameId(u32);

impl NameId {
    /// The reserved id `0`: an anonymous callee marker in call instructions.
    pub const ANONYMOUS: NameId = NameId(0);

    /// Reconstructs a `NameId` from a raw index, e.g. when decoding an
    /// instruction stream. The caller is responsible for validity.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for the reserved anonymous-callee id.
    #[inline]
    #[must_use]
    pub const fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

/// The name interner: text to id and back.
///
/// Slot `0` is seeded with the empty string at construction so that real
/// names always intern to a non-zero id. Serialization carries only the
/// text table; the lookup index is rebuilt on deserialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<Box<str>>", into = "Vec<Box<str>>")]
pub struct Names {
    texts: Vec<Box<str>>,
    index: AHashMap<Box<str>, NameId>,
}

impl From<Vec<Box<str>>> for Names {
    fn from(texts: Vec<Box<str>>) -> Self {
        let mut names = Self::new();
        for text in texts.iter().skip(1) {
            names.set(text);
        }
        names
    }
}

impl From<Names> for Vec<Box<str>> {
    fn from(names: Names) -> Self {
        names.texts
    }
}

impl Default for Names {
    fn default() -> Self {
        Self::new()
    }
}

impl Names {
    /// Creates an interner with the reserved slot `0` in place.
    #[must_use]
    pub fn new() -> Self {
        let mut names = Self {
            texts: Vec::new(),
            index: AHashMap::new(),
        };
        names.texts.push("".into());
        names.index.insert("".into(), NameId(0));
        names
    }

    /// Interns `text`, returning its id. Repeated calls with the same text
    /// return the same id.
    pub fn set(&mut self, text: &str) -> NameId {
        if let Some(&id) = self.index.get(text) {
            return id;
        }
        let id = NameId(u32::try_from(self.texts.len()).expect("name table exceeds u32 range"));
        self.texts.push(text.into());
        self.index.insert(text.into(), id);
        id
    }

    /// Returns the text for `id`, or the empty string for an id this table
    /// never produced.
    #[must_use]
    pub fn get(&self, id: NameId) -> &str {
        self.texts.get(id.index()).map_or("", |s| &**s)
    }

    /// Number of interned names, including the reserved slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Always `false`: the reserved slot exists from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
