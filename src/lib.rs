//! LearnMem runs fly learning and memory experiments. A paradigm, a table of
//! timed hardware events (lights, odors, shocks), is played on a Firmata
//! microcontroller while a camera watches a grid of arenas with one fly
//! each. Every fly position is stored together with the state of every pin
//! at that moment, so behavior can be lined up against stimuli afterwards.
//!
//! The two halves run side by side:
//!
//! - The [paradigm scheduler](scheduler) starts one thread per event.
//!   Events that begin or end at the same instant meet at a shared
//!   [barrier](barrier) so they switch together, and every write lands in the
//!   shared [pin state](pin_state).
//! - The [tracker](tracker) segments the arenas out of a rolling average of
//!   frames, gives them stable identities, and finds the fly in each of them.
//!
//! Both report to a [result sink](result_writer) and both stop, with every
//! pin written back to 0, on a [cancel token](cancel).

pub mod arena;
pub mod args;
pub mod barrier;
pub mod board;
pub mod cancel;
pub mod channel;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod contour;
pub mod error;
pub mod event_thread;
pub mod firmata;
pub mod fly;
pub mod frame_source;
pub mod gui;
pub mod image_ops;
pub mod paradigm;
pub mod paradigm_decoder;
pub mod pin_state;
pub mod result_writer;
pub mod scheduler;
pub mod status;
pub mod synthetic;
pub mod tracker;
