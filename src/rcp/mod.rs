//! Display list generation for the RCP: the command model, the modelled
//! hardware state and the geometry walk that drives both.

mod display_list;
mod geometry;
mod state;

pub use display_list::{Command, DisplayList};
pub use geometry::generate_geometry;
pub use state::RcpState;
