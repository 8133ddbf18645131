//! Process-local component type tokens.
//!
//! A [`TypeToken`] is a dense, monotonically-assigned small integer standing
//! in for a component type. Tokens are unique within one process lifetime
//! but are **not** stable across runs or processes — they must never be
//! persisted. This mirrors how the layout metadata in [`crate::layout`]
//! avoids carrying `TypeId` (which has no guaranteed cross-version
//! stability and is larger than a `u32`) through the hot path.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::OnceLock;

/// A process-local dense identifier for a component type.
///
/// Obtained via [`token_of`]. Two calls to `token_of::<T>()` for the same
/// `T` always return the same token; calls for distinct `T` always return
/// distinct tokens. The numeric value carries no meaning beyond identity
/// and must not be serialized or compared across process boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeToken(u32);

impl TypeToken {
    /// The raw token value, for use as a dense array index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

struct TokenRegistry {
    by_type: HashMap<TypeId, TypeToken>,
    next: u32,
}

static REGISTRY: OnceLock<Mutex<TokenRegistry>> = OnceLock::new();

fn registry() -> &'static Mutex<TokenRegistry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(TokenRegistry {
            by_type: HashMap::new(),
            next: 0,
        })
    })
}

/// Look up (assigning on first use) the process-local token for `T`.
///
/// Thread-safe: concurrent first-use calls for distinct types never race
/// each other onto the same token, and repeated calls for one type always
/// observe the token assigned by whichever call won the race.
pub fn token_of<T: 'static>() -> TypeToken {
    let type_id = TypeId::of::<T>();
    let mut reg = registry().lock().expect("type token registry poisoned");
    if let Some(&tok) = reg.by_type.get(&type_id) {
        return tok;
    }
    let tok = TypeToken(reg.next);
    reg.next += 1;
    reg.by_type.insert(type_id, tok);
    tok
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn same_type_same_token() {
        assert_eq!(token_of::<A>(), token_of::<A>());
    }

    #[test]
    fn distinct_types_distinct_tokens() {
        assert_ne!(token_of::<A>(), token_of::<B>());
    }

    #[test]
    fn concurrent_first_use_agrees() {
        struct Concurrent;
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(token_of::<Concurrent>))
            .collect();
        let toks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(toks.windows(2).all(|w| w[0] == w[1]));
    }
}
