pub mod polling;

pub use polling::{Activation, Liveness, PollConfig, PollEvent, Poller, TickOrigin};
