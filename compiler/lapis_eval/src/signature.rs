//! Method signature keys.
//!
//! A `SigKey` identifies a VMT slot: lower-cased method name plus the
//! normalized parameter-type keys. Two declarations with the same `SigKey`
//! occupy the same virtual slot; same name with different parameter types
//! are distinct slots (and distinct overloads).

use lapis_ir::{MethodDecl, Name, StringInterner};
use smallvec::SmallVec;
use std::fmt;

/// Normalized signature: method key plus parameter type keys.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SigKey {
    pub name: Name,
    pub params: SmallVec<[Name; 4]>,
}

impl SigKey {
    /// Compute the signature key of a declaration.
    pub fn of(decl: &MethodDecl, interner: &StringInterner) -> SigKey {
        SigKey {
            name: decl.key,
            params: decl.params.iter().map(|p| p.ty.key(interner)).collect(),
        }
    }

    /// Borrowing display helper: `speak(string, integer)`.
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> SigKeyDisplay<'a> {
        SigKeyDisplay {
            key: self,
            interner,
        }
    }
}

/// Renders a `SigKey` with its interner.
pub struct SigKeyDisplay<'a> {
    key: &'a SigKey,
    interner: &'a StringInterner,
}

impl fmt::Display for SigKeyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.interner.lookup(self.key.name))?;
        for (i, param) in self.key.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.interner.lookup(*param))?;
        }
        write!(f, ")")
    }
}

/// Render a declaration's signature for diagnostics.
pub fn describe_decl(decl: &MethodDecl, interner: &StringInterner) -> String {
    SigKey::of(decl, interner).display(interner).to_string()
}
