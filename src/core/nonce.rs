use crate::models::{CharacterPair, VisitorId};
use rand::RngCore;
use std::collections::{HashMap, VecDeque};

/// Nonce length in bytes before hex encoding (160 bits)
pub const NONCE_BYTES: usize = 20;

/// What a nonce was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceBinding {
    pub visitor: VisitorId,
    pub pair: CharacterPair,
    pub offset: usize,
}

/// Fresh unguessable token, hex encoded
pub fn mint_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issued, not yet consumed nonces
///
/// Holds at most `capacity` live tokens. Issuing past capacity evicts the
/// oldest live token, which bounds what abandoned sessions can leak.
#[derive(Debug)]
pub struct NonceLedger {
    bindings: HashMap<String, NonceBinding>,
    issue_order: VecDeque<String>,
    capacity: usize,
}

impl NonceLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bindings: HashMap::new(),
            issue_order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Mint a token bound to `(visitor, pair, offset)`
    pub fn issue(&mut self, visitor: VisitorId, pair: CharacterPair, offset: usize) -> String {
        while self.bindings.len() >= self.capacity {
            match self.issue_order.pop_front() {
                Some(oldest) => {
                    if self.bindings.remove(&oldest).is_some() {
                        tracing::debug!("Nonce ledger full, evicted oldest outstanding nonce");
                    }
                }
                None => break,
            }
        }

        let token = mint_nonce();
        self.bindings.insert(
            token.clone(),
            NonceBinding {
                visitor,
                pair,
                offset,
            },
        );
        self.issue_order.push_back(token.clone());
        self.compact();

        token
    }

    /// Remove and return the binding; `None` for unknown, consumed or revoked tokens
    pub fn consume(&mut self, token: &str) -> Option<NonceBinding> {
        self.bindings.remove(token)
    }

    /// Invalidate a token without using it
    pub fn revoke(&mut self, token: &str) -> bool {
        self.bindings.remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.bindings.contains_key(token)
    }

    /// Number of live tokens
    pub fn outstanding(&self) -> usize {
        self.bindings.len()
    }

    // Consumed and revoked tokens linger in `issue_order` until the queue
    // outgrows twice the live set
    fn compact(&mut self) {
        if self.issue_order.len() > self.bindings.len().max(self.capacity) * 2 {
            let bindings = &self.bindings;
            self.issue_order.retain(|token| bindings.contains_key(token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> VisitorId {
        VisitorId::from("192.168.1.10")
    }

    #[test]
    fn test_minted_nonce_shape() {
        let a = mint_nonce();
        let b = mint_nonce();
        assert_eq!(a.len(), NONCE_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_consume_is_single_use() {
        let mut ledger = NonceLedger::with_capacity(10);
        let pair = CharacterPair::new("a", "c");
        let token = ledger.issue(visitor(), pair.clone(), 2);

        let binding = ledger.consume(&token).unwrap();
        assert_eq!(binding.pair, pair);
        assert_eq!(binding.offset, 2);
        assert!(ledger.consume(&token).is_none());
        assert!(ledger.consume("never-issued").is_none());
    }

    #[test]
    fn test_revoke() {
        let mut ledger = NonceLedger::with_capacity(10);
        let token = ledger.issue(visitor(), CharacterPair::new("a", "b"), 0);
        assert!(ledger.revoke(&token));
        assert!(!ledger.revoke(&token));
        assert!(ledger.consume(&token).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut ledger = NonceLedger::with_capacity(2);
        let first = ledger.issue(visitor(), CharacterPair::new("a", "b"), 0);
        let second = ledger.issue(visitor(), CharacterPair::new("c", "d"), 2);
        let third = ledger.issue(visitor(), CharacterPair::new("e", "f"), 4);

        assert_eq!(ledger.outstanding(), 2);
        assert!(!ledger.contains(&first));
        assert!(ledger.contains(&second));
        assert!(ledger.contains(&third));
    }

    #[test]
    fn test_eviction_skips_consumed_tokens() {
        let mut ledger = NonceLedger::with_capacity(2);
        let first = ledger.issue(visitor(), CharacterPair::new("a", "b"), 0);
        let second = ledger.issue(visitor(), CharacterPair::new("c", "d"), 2);
        ledger.consume(&first);

        let third = ledger.issue(visitor(), CharacterPair::new("e", "f"), 4);
        assert!(ledger.contains(&second));
        assert!(ledger.contains(&third));
    }

    #[test]
    fn test_issue_order_stays_bounded() {
        let mut ledger = NonceLedger::with_capacity(4);
        for i in 0..1000 {
            let token = ledger.issue(visitor(), CharacterPair::new("a", "b"), i * 2);
            ledger.consume(&token);
        }
        assert_eq!(ledger.outstanding(), 0);
        assert!(ledger.issue_order.len() <= 8 + 1);
    }
}
