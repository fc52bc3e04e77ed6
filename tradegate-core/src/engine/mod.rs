//! Lifecycle engine: wires validator, scorer, risk manager, sizer and exit
//! manager behind one event-driven driver.
//!
//! The driver is agnostic to where events come from. `ReplaySource` feeds
//! historical bars and precomputed setups; `PollingSource` polls a live bar
//! feed and a setup source. Both go through `run_ready`/`run_events`, so a
//! backtest and a live session make identical decisions for identical inputs.

pub mod driver;
pub mod replay;

pub use driver::{EngineEvent, LifecycleDriver};
pub use replay::{
    run_events, run_ready, BarFeed, EventSource, LoggedAction, MarketSnapshot, PollingSource,
    ReplayLog, ReplaySource, SetupSource,
};
