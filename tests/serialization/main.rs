//! Serialization integration tests
//!
//! Each module drives the public API end to end: values are encoded by one
//! factory and decoded by another, which may know a different version of the
//! types or none of them at all.

mod common;

mod allow_list;
mod carpentry;
mod concurrency;
mod custom;
mod enum_evolution;
mod evolution;
mod properties;
mod round_trip;
