//! Canonical parsed-command representation.

/// One Redis command as delivered by the wire parser: an ordered vector of binary tokens.
///
/// The first token is the command name; the remaining tokens are its arguments. Arity rules are
/// expressed over the full token count, name included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCommand {
    tokens: Vec<Vec<u8>>,
}

impl RedisCommand {
    /// Creates a command from raw wire tokens.
    #[must_use]
    pub fn new(tokens: Vec<Vec<u8>>) -> Self {
        Self { tokens }
    }

    /// Builds a command from string-ish tokens. Intended for tests and tooling.
    #[must_use]
    pub fn from_tokens<T: AsRef<[u8]>>(tokens: &[T]) -> Self {
        Self {
            tokens: tokens.iter().map(|token| token.as_ref().to_vec()).collect(),
        }
    }

    /// Number of tokens, command name included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns whether the command carries no tokens at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns one token by position.
    #[must_use]
    pub fn token(&self, index: usize) -> Option<&[u8]> {
        self.tokens.get(index).map(Vec::as_slice)
    }

    /// Tokens after the command name.
    #[must_use]
    pub fn args(&self) -> &[Vec<u8>] {
        self.tokens.get(1..).unwrap_or_default()
    }

    /// Lowercased command name used as the lookup key into the command table.
    ///
    /// Non-UTF-8 name bytes are lowercased per ASCII byte and replaced lossily, matching the
    /// case-insensitive lookup contract without rejecting binary garbage before lookup fails.
    #[must_use]
    pub fn name_lowercase(&self) -> String {
        let Some(name) = self.tokens.first() else {
            return String::new();
        };
        String::from_utf8_lossy(&name.to_ascii_lowercase()).into_owned()
    }
}
