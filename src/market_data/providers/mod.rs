pub mod coingecko;

pub use coingecko::{CoinGeckoPriceSource, COINGECKO_API_BASE};
