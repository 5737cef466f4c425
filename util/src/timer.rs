use std::time::{Duration, Instant};

/// Wall-clock stopwatch for setup stages and node runs.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new `Timer`, started now.
    pub fn now() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Restart the timer.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Print a message with the elapsed time since the timer was last reset.
    pub fn print_elapsed(&self, task: &str) {
        eprintln!("{} took {}", task, format_duration(self.elapsed()));
    }
}

/// `4.21s` under a minute, `3m 07s` under an hour, `5h 12m 40s` beyond
/// (recon-all and dwifslpreproc easily run for hours).
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.2}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!("0.50s", format_duration(Duration::from_millis(500)));
        assert_eq!("1m 05s", format_duration(Duration::from_secs(65)));
        assert_eq!("2h 00m 09s", format_duration(Duration::from_secs(7209)));
    }
}
