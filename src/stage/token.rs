use std::collections::HashSet;
use std::sync::Mutex;

/// Produces random 8-hex-character tokens for staged object names.
///
/// Every token is drawn fresh from `rand`, so one observed key says nothing
/// about the next. Tokens already handed out by this generator are redrawn,
/// which keeps them distinct within a process.
#[derive(Debug, Default)]
pub struct TokenGenerator {
    first: Mutex<Option<u32>>,
    issued: Mutex<HashSet<u32>>,
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the first token to `first`; later tokens are random.
    pub fn starting_at(first: u32) -> Self {
        Self {
            first: Mutex::new(Some(first)),
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn next_token(&self) -> String {
        let pinned = self
            .first
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        let mut candidate = pinned.unwrap_or_else(rand::random);
        while !issued.insert(candidate) {
            candidate = rand::random();
        }
        format!("{:08x}", candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_token_format() {
        let tokens = TokenGenerator::new();
        for _ in 0..100 {
            let token = tokens.next_token();
            assert_eq!(token.len(), 8);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_starting_at_yields_base_first() {
        let tokens = TokenGenerator::starting_at(0xabc1_2345);
        assert_eq!(tokens.next_token(), "abc12345");
        assert_ne!(tokens.next_token(), "abc12345");
    }

    #[test]
    fn test_tokens_are_not_a_fixed_stride() {
        let tokens = TokenGenerator::new();
        let values: Vec<u32> = (0..4)
            .map(|_| u32::from_str_radix(&tokens.next_token(), 16).unwrap())
            .collect();

        let first_step = values[1].wrapping_sub(values[0]);
        assert!(values
            .windows(2)
            .skip(1)
            .any(|pair| pair[1].wrapping_sub(pair[0]) != first_step));
    }

    #[test]
    fn test_small_base_is_zero_padded() {
        let tokens = TokenGenerator::starting_at(0x2a);
        assert_eq!(tokens.next_token(), "0000002a");
    }

    #[test]
    fn test_ten_thousand_tokens_do_not_collide() {
        let tokens = TokenGenerator::new();
        let seen: HashSet<String> = (0..10_000).map(|_| tokens.next_token()).collect();
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_concurrent_tokens_do_not_collide() {
        let tokens = Arc::new(TokenGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = Arc::clone(&tokens);
                std::thread::spawn(move || {
                    (0..1_250).map(|_| tokens.next_token()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token));
            }
        }
        assert_eq!(seen.len(), 10_000);
    }
}
