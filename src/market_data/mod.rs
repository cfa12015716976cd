mod models;
mod provider;
pub mod providers;
mod service;
mod valuation;

pub use models::{FeedQuote, FeedQuotes, PriceMap, PriceQuote};
pub use provider::{NoopSource, PriceSource};
pub(crate) use service::InFlightGuard;
pub use service::PriceService;
pub use valuation::{compute_totals, PortfolioTotals};
