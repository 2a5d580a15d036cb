//! Boundary-aligned scheduling.
//!
//! ## Submodules
//!
//! - [`align`]: Boundary arithmetic ([`aligned_boundary`], [`delay_to_next_boundary`])
//!   and label rendering ([`timestamp_fields`])
//! - [`clock`]: The [`Clock`] seam, with [`SystemClock`] and [`ManualClock`]
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "2s", "500ms")
//! - [`tick`]: [`Schedule`], which picks strictly increasing tick targets
//!
//! ## Tick Flow
//!
//! ```text
//! Clock::now()
//!      │
//!      ▼
//! Schedule::next_target() ──▶ Clock::sleep(target - now)
//!      │
//!      ▼
//! timestamp_fields(target) ──▶ row label
//! ```

pub mod align;
pub mod clock;
pub mod duration;
pub mod tick;

pub use align::{
    aligned_boundary, delay_to_next_boundary, timestamp_fields, BoundaryLabel, Period, MIN_DELAY,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use tick::Schedule;
