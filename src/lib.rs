// src/lib.rs

//! Grade Notifier Library
//!
//! Polls a school grade portal, turns the grade page into a canonical
//! [`models::Report`], diffs it against the last stored one and announces
//! what is new.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
