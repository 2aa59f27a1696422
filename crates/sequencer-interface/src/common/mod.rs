//! Small shared utilities that don't belong to the domain model proper.

pub mod hex_string;
