//! # Gazette Delivery
//!
//! The Delivery Adapter: sends rendered newsletters through an
//! EmailJS-style REST endpoint. Missing credentials are fatal and
//! operator-visible; transport failures are retryable.

pub mod emailjs;

pub use emailjs::EmailJsTransport;
