//! Input and output formats for the command line surface.

pub mod csv;
