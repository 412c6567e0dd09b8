pub mod action;
pub mod controller;
pub mod display_host;
pub mod logic;
pub mod protocol;
pub mod relay_link;
pub mod server;
pub mod settings;
pub mod tetris_core;
pub mod transport;
pub mod view;
