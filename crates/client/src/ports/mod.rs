//! Port traits at the I/O seams of the prompt queue.

pub mod outbound;
