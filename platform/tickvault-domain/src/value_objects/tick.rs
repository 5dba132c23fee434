use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest observed price for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub ticker: String,
    pub mark: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub exchange: String,
    pub currency: String,
    pub updated: DateTime<Utc>,
}

impl Quote {
    pub fn to_tick(&self) -> Tick {
        Tick {
            ticker: self.ticker.clone(),
            mark: self.price,
            timestamp: self.updated,
        }
    }
}
