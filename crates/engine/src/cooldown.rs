use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Tracks when each symbol last produced an actionable decision.
#[derive(Debug, Clone)]
pub struct Cooldowns {
    period: Duration,
    last_action: HashMap<String, DateTime<Utc>>,
}

impl Cooldowns {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_action: HashMap::new(),
        }
    }

    /// True while fewer than `period` has elapsed since the symbol was marked.
    pub fn is_cooling(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.last_action
            .get(symbol)
            .is_some_and(|at| now - *at < self.period)
    }

    pub fn mark(&mut self, symbol: &str, now: DateTime<Utc>) {
        self.last_action.insert(symbol.to_string(), now);
    }

    /// Forgets entries whose cooldown has already expired.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let period = self.period;
        self.last_action.retain(|_, at| now - *at < period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_cools_for_the_configured_period() {
        let start = Utc::now();
        let mut cooldowns = Cooldowns::new(Duration::seconds(120));
        assert!(!cooldowns.is_cooling("BTCUSDT", start));

        cooldowns.mark("BTCUSDT", start);
        assert!(cooldowns.is_cooling("BTCUSDT", start + Duration::seconds(119)));
        assert!(!cooldowns.is_cooling("BTCUSDT", start + Duration::seconds(120)));
        assert!(!cooldowns.is_cooling("ETHUSDT", start));
    }

    #[test]
    fn prune_drops_expired_entries_only() {
        let start = Utc::now();
        let mut cooldowns = Cooldowns::new(Duration::seconds(60));
        cooldowns.mark("BTCUSDT", start);
        cooldowns.mark("ETHUSDT", start + Duration::seconds(50));

        cooldowns.prune(start + Duration::seconds(70));
        assert!(!cooldowns.is_cooling("BTCUSDT", start + Duration::seconds(70)));
        assert!(cooldowns.is_cooling("ETHUSDT", start + Duration::seconds(70)));
        assert_eq!(cooldowns.last_action.len(), 1);
    }
}
