use std::time::Instant;

/// Millisecond tick source used to space out polls.
///
/// Ticks are 32 bits and wrap; compare them with [`elapsed_ms`] only.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Milliseconds since the clock was created, wrapping every ~49.7 days.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Ticks between `earlier` and `now`, correct across one wrap of the counter.
pub fn elapsed_ms(earlier: u32, now: u32) -> u32 {
    now.wrapping_sub(earlier)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_without_wrap() {
        assert_eq!(elapsed_ms(1_000, 4_000), 3_000);
    }

    #[test]
    fn elapsed_across_wrap() {
        assert_eq!(elapsed_ms(u32::MAX - 999, 2_000), 3_000);
        assert_eq!(elapsed_ms(u32::MAX, 0), 1);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(elapsed_ms(a, clock.now_ms()) >= 5);
    }
}
