/// The PCP epoch field (RFC 6887 §8.5).
///
/// A monotonically-increasing counter maintained by the PCP server. A backward step
/// (beyond the tiny tolerance described below) signals that the server lost its
/// mapping state — most likely a reboot — and the client must re-`MAP` everything.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Epoch(pub u32);

impl Epoch {
    /// Validates this (the newly received) epoch against the `previous` one and the
    /// client-side time `elapsed` since then.
    ///
    /// This is RFC 6887 §8.5's procedure, carried over verbatim from the reference
    /// arithmetic in the RFC text.
    pub fn validate(&self, previous: Epoch, elapsed_secs: u32) -> bool {
        // Server time should not go backwards by more than a second (allows for minor
        // packet reordering on the path from server to client).
        if self.0 < previous.0.saturating_sub(1) {
            return false;
        }

        let client_delta = elapsed_secs;
        let server_delta = self.0.saturating_sub(previous.0);

        !(client_delta + 2 < server_delta.saturating_sub(server_delta / 16)
            || server_delta + 2 < client_delta.saturating_sub(client_delta / 16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_epoch_is_valid() {
        let prev = Epoch(1000);
        let now = Epoch(1010);
        assert!(now.validate(prev, 10));
    }

    #[test]
    fn large_backward_jump_is_invalid() {
        let prev = Epoch(1000);
        let now = Epoch(500);
        assert!(!now.validate(prev, 10));
    }

    #[test]
    fn one_second_backward_jitter_is_tolerated() {
        let prev = Epoch(1000);
        let now = Epoch(999);
        assert!(now.validate(prev, 0));
    }

    #[test]
    fn server_time_running_much_faster_than_client_is_invalid() {
        let prev = Epoch(1000);
        let now = Epoch(2000);
        assert!(!now.validate(prev, 1));
    }
}
