#![deny(rust_2018_idioms)]
#![deny(clippy::correctness)]
#![deny(clippy::perf)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod config;
pub mod error;
pub mod generator;
pub mod order;
pub mod rest;
pub mod rows;
pub mod script;
pub mod store;
pub mod verify;
