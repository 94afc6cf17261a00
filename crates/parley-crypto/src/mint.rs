//! Identity, group-identity, and token minting.
//!
//! The [`Minter`] is a dependency-injected handle on the server: tests
//! swap the [`IdProbe`] to script collision behavior without touching
//! storage. Minting draws two words from the embedded word list plus
//! four random bytes, probes the repository for collisions, and gives
//! up after a fixed number of attempts rather than looping forever.

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::RngCore;
use uuid::Uuid;

use parley_types::identity::GROUP_PREFIX;
use parley_types::{ParleyError, Result};

use crate::wordlist::WORDLIST;

/// Collision probe consulted while minting identities.
///
/// The repository's `id_exists` answers this; tests supply scripted
/// probes.
#[async_trait]
pub trait IdProbe: Send + Sync {
    async fn id_exists(&self, id: &str) -> bool;
}

/// How many candidate identities to try before giving up.
const MINT_ATTEMPTS: usize = 10;

/// Prefix on every minted bearer token.
const TOKEN_PREFIX: &str = "parley-";

/// Mints identities and tokens for one domain.
#[derive(Clone, Debug)]
pub struct Minter {
    domain: String,
}

impl Minter {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    /// Mints a fresh user identity, `word-word-hex@domain`.
    ///
    /// Probes each candidate against `probe`; ten consecutive
    /// collisions fail the mint.
    pub async fn mint_id(&self, probe: &dyn IdProbe) -> Result<String> {
        for _ in 0..MINT_ATTEMPTS {
            let id = self.candidate()?;
            if !probe.id_exists(&id).await {
                return Ok(id);
            }
        }

        Err(ParleyError::General)
    }

    /// Mints a fresh group identity, `g:word-word-hex@domain`.
    ///
    /// The probe sees the final, prefixed form: group records are
    /// stored under exactly this id.
    pub async fn mint_group_id(&self, probe: &dyn IdProbe) -> Result<String> {
        for _ in 0..MINT_ATTEMPTS {
            let id = format!("{GROUP_PREFIX}{}", self.candidate()?);
            if !probe.id_exists(&id).await {
                return Ok(id);
            }
        }

        Err(ParleyError::General)
    }

    /// Mints a bearer token from three independent UUIDs.
    ///
    /// 384 bits of randomness never collide in practice, so there is
    /// no existence probe on this path.
    pub fn mint_token(&self) -> String {
        format!(
            "{TOKEN_PREFIX}{}{}{}",
            hex::encode(Uuid::new_v4().as_bytes()),
            hex::encode(Uuid::new_v4().as_bytes()),
            hex::encode(Uuid::new_v4().as_bytes()),
        )
    }

    fn candidate(&self) -> Result<String> {
        let mut rng = OsRng;

        let first = WORDLIST.choose(&mut rng).ok_or(ParleyError::General)?;
        let second = WORDLIST.choose(&mut rng).ok_or(ParleyError::General)?;

        let mut suffix = [0u8; 4];
        rng.try_fill_bytes(&mut suffix)
            .map_err(|_| ParleyError::General)?;

        Ok(format!(
            "{first}-{second}-{}@{}",
            hex::encode(suffix),
            self.domain
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that reports a collision for the first `n` calls.
    struct CollideFirst {
        n: usize,
        calls: AtomicUsize,
    }

    impl CollideFirst {
        fn new(n: usize) -> Self {
            Self {
                n,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdProbe for CollideFirst {
        async fn id_exists(&self, _id: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) < self.n
        }
    }

    #[tokio::test]
    async fn uncollided_mint_returns_first_candidate() -> Result<()> {
        let minter = Minter::new("example.com");
        let probe = CollideFirst::new(0);

        let id = minter.mint_id(&probe).await?;
        assert!(id.ends_with("@example.com"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn mint_retries_past_collisions() -> Result<()> {
        let minter = Minter::new("example.com");
        let probe = CollideFirst::new(3);

        let id = minter.mint_group_id(&probe).await?;
        assert!(id.starts_with("g:"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[tokio::test]
    async fn ten_collisions_fail_the_mint() {
        let minter = Minter::new("example.com");
        let probe = CollideFirst::new(10);

        assert_eq!(
            minter.mint_id(&probe).await,
            Err(ParleyError::General)
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn group_candidates_are_probed_in_final_form() {
        struct SeenPrefixed(AtomicUsize);

        #[async_trait]
        impl IdProbe for SeenPrefixed {
            async fn id_exists(&self, id: &str) -> bool {
                assert!(id.starts_with("g:"), "probe saw unprefixed id {id}");
                self.0.fetch_add(1, Ordering::SeqCst);
                false
            }
        }

        let minter = Minter::new("example.com");
        let probe = SeenPrefixed(AtomicUsize::new(0));
        let id = minter.mint_group_id(&probe).await.unwrap();

        assert!(id.starts_with("g:"));
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn token_shape() {
        let minter = Minter::new("example.com");
        let token = minter.mint_token();

        assert!(token.starts_with(TOKEN_PREFIX));
        // Three UUIDs, sixteen bytes each, hex-encoded.
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 3 * 32);
        assert_ne!(token, minter.mint_token());
    }

    #[test]
    fn identity_shape() {
        let minter = Minter::new("example.com");
        let id = minter.candidate().unwrap();

        let (local, domain) = id.split_once('@').unwrap();
        assert_eq!(domain, "example.com");
        assert_eq!(local.split('-').count(), 3);
    }
}
