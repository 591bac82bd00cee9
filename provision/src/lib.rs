//! Provisions PHP (and Java) runtime images: localizes the package mirror,
//! resolves and runs a bootstrap script, and registers a hook that downstream
//! builds trigger with `extend`.

pub mod backends;
pub mod controller;
pub mod dockerfile;
pub mod error;
pub mod frontends;
pub mod hasher;
pub mod mirror;
pub mod models;
pub mod overlay;
pub mod services;
