//! Synthetic shop traffic against the deployed frontend.
//!
//! Traffic is shaped by a named pattern (concurrent users and duration) and
//! a weighted mix of user journeys. Randomness is supplied by the caller so
//! the mix is testable with fixed rolls.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Product IDs the demo shop frontend serves.
pub const PRODUCT_IDS: &[&str] = &[
    "OLJCESPC7Z",
    "66VCHSJNUP",
    "1YMWWN1N4O",
    "L9ECAV7KIM",
    "2ZYFJ3GM2N",
    "0PUK6V6EV0",
    "LS4PSXUNUM",
    "9SIQT8TOJO",
    "6E92ZMYYFZ",
];

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPattern {
    Low,
    Medium,
    High,
    Spike,
}

impl TrafficPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficPattern::Low => "low",
            TrafficPattern::Medium => "medium",
            TrafficPattern::High => "high",
            TrafficPattern::Spike => "spike",
        }
    }

    /// Concurrent simulated users.
    pub fn users(&self) -> usize {
        match self {
            TrafficPattern::Low => 5,
            TrafficPattern::Medium => 20,
            TrafficPattern::High => 50,
            TrafficPattern::Spike => 100,
        }
    }

    pub fn default_duration(&self) -> Duration {
        match self {
            TrafficPattern::Low => Duration::from_secs(3600),
            TrafficPattern::Medium => Duration::from_secs(1800),
            TrafficPattern::High => Duration::from_secs(600),
            TrafficPattern::Spike => Duration::from_secs(300),
        }
    }
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficPattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(TrafficPattern::Low),
            "medium" => Ok(TrafficPattern::Medium),
            "high" => Ok(TrafficPattern::High),
            "spike" => Ok(TrafficPattern::Spike),
            other => Err(format!("unknown traffic pattern: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Journeys
// ---------------------------------------------------------------------------

/// A named page sequence with its share of the traffic mix.
#[derive(Debug, Clone, Copy)]
pub struct Journey {
    pub name: &'static str,
    pub weight: f64,
    pub pages: &'static [JourneyPage],
}

/// A page in a journey. Product pages substitute a product ID chosen per
/// visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyPage {
    Home,
    Product,
    Search,
    Cart,
    Checkout,
}

impl JourneyPage {
    /// The request path, with `product_id` substituted where relevant.
    pub fn path(&self, product_id: &str) -> String {
        match self {
            JourneyPage::Home => "/".to_string(),
            JourneyPage::Product => format!("/product/{product_id}"),
            JourneyPage::Search => "/search?q=camera".to_string(),
            JourneyPage::Cart => "/cart".to_string(),
            JourneyPage::Checkout => "/checkout".to_string(),
        }
    }
}

pub const JOURNEYS: &[Journey] = &[
    Journey {
        name: "browser",
        weight: 0.40,
        pages: &[JourneyPage::Home, JourneyPage::Product, JourneyPage::Product],
    },
    Journey {
        name: "searcher",
        weight: 0.25,
        pages: &[JourneyPage::Home, JourneyPage::Search, JourneyPage::Product],
    },
    Journey {
        name: "cart_abandoner",
        weight: 0.20,
        pages: &[JourneyPage::Home, JourneyPage::Product, JourneyPage::Cart],
    },
    Journey {
        name: "buyer",
        weight: 0.15,
        pages: &[
            JourneyPage::Home,
            JourneyPage::Product,
            JourneyPage::Cart,
            JourneyPage::Checkout,
        ],
    },
];

/// Pick a journey from a roll in `[0, 1)` by cumulative weight. Rolls at or
/// past the total weight fall through to the last journey.
pub fn select_journey(roll: f64) -> &'static Journey {
    let mut cumulative = 0.0;
    for journey in JOURNEYS {
        cumulative += journey.weight;
        if roll < cumulative {
            return journey;
        }
    }
    &JOURNEYS[JOURNEYS.len() - 1]
}

/// Pick a product ID from a roll in `[0, 1)`.
pub fn select_product(roll: f64) -> &'static str {
    let index = ((roll * PRODUCT_IDS.len() as f64) as usize).min(PRODUCT_IDS.len() - 1);
    PRODUCT_IDS[index]
}

// ---------------------------------------------------------------------------
// Load loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct TrafficReport {
    pub requests_sent: u64,
    pub requests_failed: u64,
}

/// Drive `pattern.users()` concurrent users against `target_url` for
/// `duration`. `roll` supplies randomness in `[0, 1)`.
pub async fn run_load(
    target_url: &str,
    pattern: TrafficPattern,
    duration: Duration,
    roll: impl Fn() -> f64 + Send + Sync + 'static,
) -> TrafficReport {
    info!(
        %pattern,
        users = pattern.users(),
        duration_secs = duration.as_secs(),
        %target_url,
        "starting traffic generation"
    );
    let base = target_url.trim_end_matches('/').to_string();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();
    let sent = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let roll = Arc::new(roll);
    let deadline = Instant::now() + duration;

    let mut users = Vec::with_capacity(pattern.users());
    for _ in 0..pattern.users() {
        let base = base.clone();
        let client = client.clone();
        let sent = Arc::clone(&sent);
        let failed = Arc::clone(&failed);
        let roll = Arc::clone(&roll);
        users.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                let journey = select_journey(roll());
                let product = select_product(roll());
                debug!(journey = journey.name, product, "journey start");
                for page in journey.pages {
                    if Instant::now() >= deadline {
                        break;
                    }
                    let url = format!("{base}{}", page.path(product));
                    sent.fetch_add(1, Ordering::Relaxed);
                    match client.get(&url).send().await {
                        Ok(response) if response.status().is_success() => {}
                        _ => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }));
    }
    for user in users {
        let _ = user.await;
    }

    TrafficReport {
        requests_sent: sent.load(Ordering::Relaxed),
        requests_failed: failed.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_parameters_match_their_names() {
        assert_eq!(TrafficPattern::Low.users(), 5);
        assert_eq!(TrafficPattern::Spike.users(), 100);
        assert_eq!(TrafficPattern::Medium.default_duration(), Duration::from_secs(1800));
        assert_eq!(TrafficPattern::High.default_duration(), Duration::from_secs(600));
    }

    #[test]
    fn pattern_round_trips_through_str() {
        for pattern in [
            TrafficPattern::Low,
            TrafficPattern::Medium,
            TrafficPattern::High,
            TrafficPattern::Spike,
        ] {
            assert_eq!(pattern.as_str().parse::<TrafficPattern>().unwrap(), pattern);
        }
        assert!("extreme".parse::<TrafficPattern>().is_err());
    }

    #[test]
    fn journey_weights_sum_to_one() {
        let total: f64 = JOURNEYS.iter().map(|j| j.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn journey_selection_follows_cumulative_weights() {
        assert_eq!(select_journey(0.0).name, "browser");
        assert_eq!(select_journey(0.39).name, "browser");
        assert_eq!(select_journey(0.40).name, "searcher");
        assert_eq!(select_journey(0.64).name, "searcher");
        assert_eq!(select_journey(0.65).name, "cart_abandoner");
        assert_eq!(select_journey(0.85).name, "buyer");
        assert_eq!(select_journey(0.9999).name, "buyer");
    }

    #[test]
    fn product_selection_covers_the_catalog() {
        assert_eq!(select_product(0.0), PRODUCT_IDS[0]);
        assert_eq!(select_product(0.9999), PRODUCT_IDS[PRODUCT_IDS.len() - 1]);
    }

    #[test]
    fn buyer_journey_ends_at_checkout() {
        let buyer = JOURNEYS.iter().find(|j| j.name == "buyer").unwrap();
        assert_eq!(buyer.pages.last(), Some(&JourneyPage::Checkout));
    }

    #[test]
    fn product_pages_substitute_the_id() {
        assert_eq!(JourneyPage::Product.path("OLJCESPC7Z"), "/product/OLJCESPC7Z");
        assert_eq!(JourneyPage::Home.path("OLJCESPC7Z"), "/");
    }

    #[tokio::test]
    async fn zero_duration_load_sends_nothing() {
        let report = run_load(
            "http://127.0.0.1:1",
            TrafficPattern::Low,
            Duration::ZERO,
            || 0.5,
        )
        .await;
        assert_eq!(report.requests_sent, 0);
    }
}
