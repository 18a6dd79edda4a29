use dashmap::{DashMap, DashSet};
use log::debug;
use std::sync::Arc;

use crate::models::{BlacklistKind, Token};

/// Concurrent mint -> token map. The first instance stored for a mint wins and
/// is the one every caller gets back afterwards.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<String, Arc<Token>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mint: &str) -> Option<Arc<Token>> {
        self.tokens.get(mint).map(|t| Arc::clone(t.value()))
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.tokens.contains_key(mint)
    }

    /// Stores `token` unless the mint is already cached, and returns the cached
    /// instance either way.
    pub fn insert(&self, token: Arc<Token>) -> Arc<Token> {
        let entry = self
            .tokens
            .entry(token.mint().to_string())
            .or_insert(token);
        Arc::clone(entry.value())
    }

    pub fn get_or_insert_with<F>(&self, mint: &str, make: F) -> Arc<Token>
    where
        F: FnOnce() -> Token,
    {
        let entry = self
            .tokens
            .entry(mint.to_string())
            .or_insert_with(|| Arc::new(make()));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn mints(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.key().clone()).collect()
    }

    pub fn values(&self) -> Vec<Arc<Token>> {
        self.tokens.iter().map(|t| Arc::clone(t.value())).collect()
    }
}

/// Append-only set of mints a remote API cannot serve.
#[derive(Debug)]
pub struct Blacklist {
    kind: BlacklistKind,
    mints: DashSet<String>,
}

impl Blacklist {
    pub fn new(kind: BlacklistKind) -> Self {
        Self {
            kind,
            mints: DashSet::new(),
        }
    }

    pub fn kind(&self) -> BlacklistKind {
        self.kind
    }

    /// Returns `true` only for the call that actually added the mint.
    pub fn insert(&self, mint: &str) -> bool {
        let added = self.mints.insert(mint.to_string());
        if added {
            debug!("Added {} to the {} blacklist", mint, self.kind);
        }
        added
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.mints.contains(mint)
    }

    pub fn extend<I>(&self, mints: I)
    where
        I: IntoIterator<Item = String>,
    {
        for mint in mints {
            self.mints.insert(mint);
        }
    }

    pub fn len(&self) -> usize {
        self.mints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mints.is_empty()
    }
}
