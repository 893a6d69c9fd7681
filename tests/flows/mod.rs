mod questions;
mod synchronous;
mod timeouts;
