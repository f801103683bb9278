//! Shared helpers for overdue-core integration tests

#![allow(dead_code)]

pub mod doubles;
pub mod fixtures;
