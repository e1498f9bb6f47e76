//! Library crate for retro-trivia-sync: the room service, its HTTP surface and
//! the client-side session synchronizer.

pub mod client;
pub mod clock;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
