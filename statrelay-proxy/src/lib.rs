pub mod cors;
pub mod forward;
pub mod relay;
pub mod server;

pub use forward::StatisticsClient;
pub use relay::{RelayResponse, StatisticsRelay};
pub use server::{RelayState, build_router, serve};
