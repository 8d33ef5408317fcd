//! I/O primitives: the line reader (C1) on the input side and lazily
//! opened sinks (part of C8) on the output side.

pub mod linereader;
pub mod writers;
