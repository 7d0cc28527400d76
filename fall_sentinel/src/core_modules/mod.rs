// The synchronous detection core. Nothing in here performs I/O, reads a clock or
// spawns a task; every function is driven entirely by its arguments.

pub mod landmark;
pub mod pose_frame;
pub mod frame_history;
pub mod feature_extractor;
pub mod severity;
pub mod fall_state;
pub mod fall_event;

#[cfg(test)]
pub(crate) mod test_support;
