/*
 * Scheduling policies
 *
 * The two mutually exclusive algorithms SPEC_FULL calls for. `config::get().mlfqs`
 * decides, once, which one `scheduler_manager::init` boxes up as the active
 * `Scheduler`; there is no runtime switch between them.
 */

pub mod mlfqs;
pub mod strict;

pub use mlfqs::MlfqsPolicy;
pub use strict::StrictPriorityPolicy;
