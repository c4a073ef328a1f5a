pub mod client;

pub use client::HttpIntentExtractor;
