pub mod agents;
pub mod config;
pub mod controller;
pub mod events;
pub mod id;
pub mod logging;
pub mod network;
pub mod random;
pub mod snapshot;
pub mod time_queue;
pub mod vehicles;
