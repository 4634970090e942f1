//! Wrappers that let a [`StateMachine`](super::StateMachine) runner inject system resources,
//! such as the current time, as ordinary input.

pub mod input;
