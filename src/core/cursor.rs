//! Monotonic position in a run's event stream.

/// Next event index to request from the stream
///
/// The cursor only moves forward. Messages whose explicit sequence is
/// behind it were already delivered and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCursor {
    next: u64,
}

impl EventCursor {
    pub fn new(start: u64) -> Self {
        Self { next: start }
    }

    /// Position to resume from after a reconnect
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Advance past one message
    ///
    /// With a sequence identifier the cursor becomes `sequence + 1`;
    /// without one it moves by one. Returns the new position, or `None` when
    /// the message is a redelivery.
    pub fn advance(&mut self, sequence: Option<u64>) -> Option<u64> {
        match sequence {
            Some(seq) if seq < self.next => None,
            Some(seq) => {
                self.next = seq.saturating_add(1);
                Some(self.next)
            }
            None => {
                self.next = self.next.saturating_add(1);
                Some(self.next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_sequence() {
        let mut cursor = EventCursor::new(0);
        assert_eq!(cursor.advance(Some(0)), Some(1));
        assert_eq!(cursor.advance(Some(4)), Some(5));
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn test_missing_sequence_increments() {
        let mut cursor = EventCursor::new(3);
        assert_eq!(cursor.advance(None), Some(4));
        assert_eq!(cursor.advance(None), Some(5));
    }

    #[test]
    fn test_redelivery_is_rejected() {
        let mut cursor = EventCursor::new(0);
        cursor.advance(Some(0));
        cursor.advance(Some(1));
        assert_eq!(cursor.advance(Some(1)), None);
        assert_eq!(cursor.advance(Some(0)), None);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.advance(Some(2)), Some(3));
    }

    #[test]
    fn test_positions_strictly_increase() {
        let mut cursor = EventCursor::new(0);
        let inputs = [Some(0), None, Some(1), Some(5), None, Some(3), Some(7)];
        let accepted: Vec<u64> = inputs.iter().filter_map(|s| cursor.advance(*s)).collect();
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(accepted, vec![1, 2, 6, 7, 8]);
    }
}
