//! Component A: Market Store & Live Quote Layer (spec §4.A).

pub mod live_quote;
pub mod market_store;

pub use live_quote::price_cascade;
pub use market_store::MarketStore;
