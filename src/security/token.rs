//! Token collaborators used by directors.
//!
//! # Responsibilities
//! - Issue random correlation tokens
//! - Exchange long-lived public tokens for short-lived signed ones
//!
//! # Design Decisions
//! - Directors only see the traits; signing lives behind `TokenExchanger`
//! - The in-memory store pairs public tokens with pre-issued signed tokens
//!   and never touches key material itself

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const TOKEN_CHARSET: &[u8] = b"1234567890qwertyuiopasdfghjklzxcvbnmQWERTYUIOPASDFGHJKLZXCVBNM";

/// Errors returned by token collaborators.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("entropy source failed: {0}")]
    Entropy(String),

    #[error("invalid token")]
    InvalidToken,
}

/// Source of random tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, length: usize) -> Result<String, TokenError>;
}

/// Exchanges an opaque public token for a signed one.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, token: &str) -> Result<String, TokenError>;
}

/// Issues alphanumeric tokens from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn issue(&self, length: usize) -> Result<String, TokenError> {
        // Largest multiple of the charset size that fits in a byte; bytes at
        // or above it are discarded to keep the distribution uniform.
        let limit = (256 / TOKEN_CHARSET.len() * TOKEN_CHARSET.len()) as u8;
        let mut token = String::with_capacity(length);
        let mut buf = [0u8; 64];

        while token.len() < length {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| TokenError::Entropy(e.to_string()))?;
            for byte in buf.iter().filter(|b| **b < limit) {
                token.push(TOKEN_CHARSET[*byte as usize % TOKEN_CHARSET.len()] as char);
                if token.len() == length {
                    break;
                }
            }
        }
        Ok(token)
    }
}

/// In-process mapping of public tokens to signed tokens.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, String>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, public: impl Into<String>, signed: impl Into<String>) {
        self.tokens.insert(public.into(), signed.into());
    }

    pub fn get(&self, public: &str) -> Option<String> {
        self.tokens.get(public).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, public: &str) -> bool {
        self.tokens.remove(public).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InMemoryTokenStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let store = Self::new();
        for (public, signed) in iter {
            store.put(public, signed);
        }
        store
    }
}

#[async_trait]
impl TokenExchanger for InMemoryTokenStore {
    async fn exchange(&self, token: &str) -> Result<String, TokenError> {
        self.get(token).ok_or(TokenError::InvalidToken)
    }
}
