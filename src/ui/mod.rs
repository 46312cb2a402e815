//! Terminal output for the CLI
//!
//! Uses `cliclack` spinners and log lines in interactive terminals, with
//! automatic fallback to plain `[OK]`/`[FAIL]` lines in CI and pipes.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
