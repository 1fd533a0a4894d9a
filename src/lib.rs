#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod audio;
pub(crate) mod clients;
pub mod config;
pub mod eligibility;
pub mod observability;
pub(crate) mod pipeline;
pub mod scheduler;
pub(crate) mod store;
