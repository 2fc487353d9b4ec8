//! HTTP request handlers

pub mod auth;
pub mod clients;
pub mod health;
pub mod visits;
