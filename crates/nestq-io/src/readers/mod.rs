//! Schema-guided readers producing `Record` trees.

pub mod json;
